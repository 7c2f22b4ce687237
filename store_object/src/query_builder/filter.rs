//! Predicate expression trees
//!
//! A predicate is data, not code: it can be validated, rendered to SQL, evaluated
//! against a serialized row and turned into a canonical cache-key token.

use crate::errors::RepositoryError;
use crate::validation::ValidatedFieldPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    Eq,        // =
    Ne,        // !=
    Gt,        // >
    Gte,       // >=
    Lt,        // <
    Lte,       // <=
    Like,      // LIKE
    ILike,     // ILIKE (case insensitive)
    In,        // IN
    NotIn,     // NOT IN
    IsNull,    // IS NULL
    IsNotNull, // IS NOT NULL
}

impl QueryOperator {
    pub fn token(&self) -> &'static str {
        match self {
            QueryOperator::Eq => "eq",
            QueryOperator::Ne => "ne",
            QueryOperator::Gt => "gt",
            QueryOperator::Gte => "gte",
            QueryOperator::Lt => "lt",
            QueryOperator::Lte => "lte",
            QueryOperator::Like => "like",
            QueryOperator::ILike => "ilike",
            QueryOperator::In => "in",
            QueryOperator::NotIn => "nin",
            QueryOperator::IsNull => "null",
            QueryOperator::IsNotNull => "notnull",
        }
    }

    fn takes_list(&self) -> bool {
        matches!(self, QueryOperator::In | QueryOperator::NotIn)
    }

    fn takes_no_value(&self) -> bool {
        matches!(self, QueryOperator::IsNull | QueryOperator::IsNotNull)
    }
}

/// Single condition in WHERE clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCondition {
    pub field: String,
    pub operator: QueryOperator,
    pub value: Option<Value>, // None for IS NULL/IS NOT NULL
}

/// Logical operators for combining conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    fn token(&self) -> &'static str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
        }
    }
}

/// Filter expression that can be nested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Condition(QueryCondition),
    Group {
        operator: LogicalOperator,
        filters: Vec<Predicate>,
    },
}

impl Predicate {
    /// Create a simple condition
    pub fn condition(field: &str, operator: QueryOperator, value: Option<Value>) -> Self {
        Self::Condition(QueryCondition {
            field: field.to_string(),
            operator,
            value,
        })
    }

    /// Create AND group
    pub fn and(filters: Vec<Predicate>) -> Self {
        Self::Group {
            operator: LogicalOperator::And,
            filters,
        }
    }

    /// Create OR group
    pub fn or(filters: Vec<Predicate>) -> Self {
        Self::Group {
            operator: LogicalOperator::Or,
            filters,
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Eq, Some(value.into()))
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Ne, Some(value.into()))
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Gt, Some(value.into()))
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Gte, Some(value.into()))
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Lt, Some(value.into()))
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Lte, Some(value.into()))
    }

    /// LIKE condition, `%` and `_` wildcards
    pub fn like(field: &str, pattern: &str) -> Self {
        Self::condition(
            field,
            QueryOperator::Like,
            Some(Value::String(pattern.to_string())),
        )
    }

    /// ILIKE condition (case insensitive)
    pub fn ilike(field: &str, pattern: &str) -> Self {
        Self::condition(
            field,
            QueryOperator::ILike,
            Some(Value::String(pattern.to_string())),
        )
    }

    pub fn in_values(field: &str, values: Vec<Value>) -> Self {
        Self::condition(field, QueryOperator::In, Some(Value::Array(values)))
    }

    pub fn not_in_values(field: &str, values: Vec<Value>) -> Self {
        Self::condition(field, QueryOperator::NotIn, Some(Value::Array(values)))
    }

    pub fn is_null(field: &str) -> Self {
        Self::condition(field, QueryOperator::IsNull, None)
    }

    pub fn is_not_null(field: &str) -> Self {
        Self::condition(field, QueryOperator::IsNotNull, None)
    }

    /// AND-combine with another predicate, flattening into an existing AND group
    pub fn and_also(self, other: Predicate) -> Self {
        match self {
            Predicate::Group {
                operator: LogicalOperator::And,
                mut filters,
            } => {
                filters.push(other);
                Predicate::and(filters)
            }
            single => Predicate::and(vec![single, other]),
        }
    }

    /// Check field paths and operator/value shapes
    pub fn validate(&self) -> Result<(), RepositoryError> {
        match self {
            Predicate::Condition(condition) => condition.validate(),
            Predicate::Group { operator, filters } => {
                if filters.is_empty() {
                    return Err(RepositoryError::invalid_argument(
                        "predicate",
                        format!("{} group has no conditions", operator.token()),
                    ));
                }
                filters.iter().try_for_each(Predicate::validate)
            }
        }
    }

    /// Canonical token identifying the predicate's meaning.
    ///
    /// AND/OR children are order-insensitive and nested groups of the same operator
    /// are flattened; IN lists are sorted and de-duplicated. Literals are compared by
    /// their JSON text, so `1` and `1.0` give different tokens and separate cache entries.
    pub fn key_token(&self) -> String {
        match self {
            Predicate::Condition(condition) => condition.key_token(),
            Predicate::Group { operator, filters } => {
                let mut tokens = Vec::with_capacity(filters.len());
                collect_group_tokens(*operator, filters, &mut tokens);
                tokens.sort();
                tokens.dedup();
                if tokens.len() == 1 {
                    return tokens.remove(0);
                }
                format!("{}({})", operator.token(), tokens.join(","))
            }
        }
    }

    /// Every field path referenced by this predicate
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Predicate::Condition(condition) => vec![condition.field.as_str()],
            Predicate::Group { filters, .. } => filters.iter().flat_map(Predicate::fields).collect(),
        }
    }
}

fn collect_group_tokens(operator: LogicalOperator, filters: &[Predicate], tokens: &mut Vec<String>) {
    for filter in filters {
        match filter {
            Predicate::Group {
                operator: inner,
                filters: nested,
            } if *inner == operator => collect_group_tokens(operator, nested, tokens),
            other => tokens.push(other.key_token()),
        }
    }
}

impl QueryCondition {
    fn validate(&self) -> Result<(), RepositoryError> {
        ValidatedFieldPath::new(&self.field).map_err(|e| {
            RepositoryError::invalid_argument("predicate", format!("field '{}': {}", self.field, e))
        })?;

        let shape_error = |message: &str| {
            Err(RepositoryError::invalid_argument(
                "predicate",
                format!("{} on '{}' {}", self.operator.token(), self.field, message),
            ))
        };

        match (&self.operator, &self.value) {
            (op, _) if op.takes_no_value() => Ok(()),
            (op, Some(Value::Array(_))) if op.takes_list() => Ok(()),
            (op, _) if op.takes_list() => shape_error("requires a list of values"),
            (QueryOperator::Like | QueryOperator::ILike, Some(Value::String(_))) => Ok(()),
            (QueryOperator::Like | QueryOperator::ILike, _) => shape_error("requires a string pattern"),
            (_, None | Some(Value::Null)) => shape_error("requires a value"),
            _ => Ok(()),
        }
    }

    fn key_token(&self) -> String {
        let literal = match (&self.operator, &self.value) {
            (op, _) if op.takes_no_value() => String::new(),
            (op, Some(Value::Array(values))) if op.takes_list() => {
                let mut items: Vec<String> = values.iter().map(canonical_json).collect();
                items.sort();
                items.dedup();
                format!("[{}]", items.join(","))
            }
            (_, Some(value)) => canonical_json(value),
            (_, None) => "null".to_string(),
        };
        format!("{}:{}:{}", self.field, self.operator.token(), literal)
    }
}

/// Compact JSON with object keys in sorted order
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
