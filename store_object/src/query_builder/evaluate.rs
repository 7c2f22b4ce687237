//! In-memory predicate evaluation
//!
//! Rows are evaluated in their serialized JSON form. Dotted field paths walk
//! nested objects; a missing field reads as null and null never compares.

use crate::query_builder::filter::{LogicalOperator, Predicate, QueryCondition, QueryOperator};
use serde_json::Value;
use std::cmp::Ordering;

impl Predicate {
    /// Evaluate the predicate against a serialized row
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Predicate::Condition(condition) => condition.matches(row),
            Predicate::Group {
                operator: LogicalOperator::And,
                filters,
            } => filters.iter().all(|f| f.matches(row)),
            Predicate::Group {
                operator: LogicalOperator::Or,
                filters,
            } => filters.iter().any(|f| f.matches(row)),
        }
    }
}

impl QueryCondition {
    fn matches(&self, row: &Value) -> bool {
        let field = lookup(row, &self.field);

        match self.operator {
            QueryOperator::IsNull => field.is_none(),
            QueryOperator::IsNotNull => field.is_some(),
            _ => {
                let (Some(actual), Some(expected)) = (field, self.value.as_ref()) else {
                    return false;
                };
                self.compare(actual, expected)
            }
        }
    }

    fn compare(&self, actual: &Value, expected: &Value) -> bool {
        match self.operator {
            QueryOperator::Eq => values_equal(actual, expected),
            QueryOperator::Ne => !expected.is_null() && !values_equal(actual, expected),
            QueryOperator::Gt => compare_values(actual, expected) == Some(Ordering::Greater),
            QueryOperator::Gte => matches!(
                compare_values(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            QueryOperator::Lt => compare_values(actual, expected) == Some(Ordering::Less),
            QueryOperator::Lte => matches!(
                compare_values(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            QueryOperator::Like => match (actual, expected) {
                (Value::String(text), Value::String(pattern)) => like_match(text, pattern),
                _ => false,
            },
            QueryOperator::ILike => match (actual, expected) {
                (Value::String(text), Value::String(pattern)) => {
                    like_match(&text.to_lowercase(), &pattern.to_lowercase())
                }
                _ => false,
            },
            QueryOperator::In => match expected {
                Value::Array(options) => options.iter().any(|o| values_equal(actual, o)),
                _ => false,
            },
            QueryOperator::NotIn => match expected {
                Value::Array(options) => !options.iter().any(|o| values_equal(actual, o)),
                _ => false,
            },
            QueryOperator::IsNull | QueryOperator::IsNotNull => false,
        }
    }
}

/// Resolve a dotted path; explicit nulls read as missing
pub(crate) fn lookup<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = row;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => false,
        _ => a == b,
    }
}

/// Ordering between two JSON scalars of the same type
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL LIKE matching: `%` matches any run of characters, `_` exactly one
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // Classic wildcard matching with single backtrack point for the last `%`
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}
