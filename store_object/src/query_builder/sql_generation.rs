//! SQL generation
//!
//! Renders query shapes into PostgreSQL clauses with numbered placeholders. Field
//! references are quoted and qualified with the row alias; literals are never
//! inlined but returned for binding.

use crate::query_builder::filter::{LogicalOperator, Predicate, QueryCondition, QueryOperator};
use crate::query_builder::ordering::SortSpec;
use crate::validation::quote_identifier;
use serde_json::Value;

pub struct SqlGenerator;

impl SqlGenerator {
    /// Build WHERE clause; placeholders start after `param_offset`
    pub fn build_where_clause(
        predicate: Option<&Predicate>,
        alias: &str,
        param_offset: usize,
    ) -> (String, Vec<Value>) {
        let Some(predicate) = predicate else {
            return (String::new(), Vec::new());
        };

        let mut values = Vec::new();
        let mut param_counter = param_offset + 1;
        let condition_sql = Self::build_condition_sql(predicate, alias, &mut values, &mut param_counter);

        (format!("WHERE {}", condition_sql), values)
    }

    fn build_condition_sql(
        filter: &Predicate,
        alias: &str,
        values: &mut Vec<Value>,
        param_counter: &mut usize,
    ) -> String {
        match filter {
            Predicate::Condition(condition) => {
                Self::build_single_condition_sql(condition, alias, values, param_counter)
            }
            Predicate::Group { operator, filters } => {
                let operator_str = match operator {
                    LogicalOperator::And => " AND ",
                    LogicalOperator::Or => " OR ",
                };

                let group_conditions = filters
                    .iter()
                    .map(|f| Self::build_condition_sql(f, alias, values, param_counter))
                    .collect::<Vec<_>>()
                    .join(operator_str);

                format!("({})", group_conditions)
            }
        }
    }

    fn build_single_condition_sql(
        condition: &QueryCondition,
        alias: &str,
        values: &mut Vec<Value>,
        param_counter: &mut usize,
    ) -> String {
        let field = Self::column_ref(alias, &condition.field);

        let mut bind = |value: &Value| {
            values.push(value.clone());
            let param = format!("${}", param_counter);
            *param_counter += 1;
            param
        };

        let comparison = |op: &str, value: Option<&Value>, bind: &mut dyn FnMut(&Value) -> String| match value {
            Some(value) if !value.is_null() => format!("{} {} {}", field, op, bind(value)),
            _ => "1=0".to_string(),
        };

        match condition.operator {
            QueryOperator::Eq => match &condition.value {
                Some(value) if !value.is_null() => format!("{} = {}", field, bind(value)),
                _ => format!("{} IS NULL", field),
            },
            QueryOperator::Ne => match &condition.value {
                Some(value) if !value.is_null() => format!("{} != {}", field, bind(value)),
                _ => format!("{} IS NOT NULL", field),
            },
            QueryOperator::Gt => comparison(">", condition.value.as_ref(), &mut bind),
            QueryOperator::Gte => comparison(">=", condition.value.as_ref(), &mut bind),
            QueryOperator::Lt => comparison("<", condition.value.as_ref(), &mut bind),
            QueryOperator::Lte => comparison("<=", condition.value.as_ref(), &mut bind),
            QueryOperator::Like => comparison("LIKE", condition.value.as_ref(), &mut bind),
            QueryOperator::ILike => comparison("ILIKE", condition.value.as_ref(), &mut bind),
            QueryOperator::In => match &condition.value {
                Some(Value::Array(items)) if !items.is_empty() => {
                    let placeholders: Vec<String> = items.iter().map(&mut bind).collect();
                    format!("{} IN ({})", field, placeholders.join(", "))
                }
                _ => "1=0".to_string(),
            },
            QueryOperator::NotIn => match &condition.value {
                Some(Value::Array(items)) if !items.is_empty() => {
                    let placeholders: Vec<String> = items.iter().map(&mut bind).collect();
                    format!("{} NOT IN ({})", field, placeholders.join(", "))
                }
                _ => format!("{} IS NOT NULL", field),
            },
            QueryOperator::IsNull => format!("{} IS NULL", field),
            QueryOperator::IsNotNull => format!("{} IS NOT NULL", field),
        }
    }

    /// Build ORDER BY clause, falling back to `fallback` so paging is stable
    pub fn build_order_clause(sort: &[SortSpec], alias: &str, fallback: &str) -> String {
        if sort.is_empty() {
            return format!("ORDER BY {} ASC", Self::column_ref(alias, fallback));
        }

        let order_items: Vec<String> = sort
            .iter()
            .map(|spec| format!("{} {}", Self::column_ref(alias, &spec.field), spec.direction.to_sql()))
            .collect();

        format!("ORDER BY {}", order_items.join(", "))
    }

    /// Build LIMIT/OFFSET clause
    pub fn build_limit_clause(limit: Option<u64>, offset: Option<u64>) -> String {
        let mut clauses = Vec::new();

        if let Some(limit) = limit {
            clauses.push(format!("LIMIT {}", limit));
        }

        if let Some(offset) = offset {
            clauses.push(format!("OFFSET {}", offset));
        }

        clauses.join(" ")
    }

    /// Quoted `alias.column` reference
    pub fn column_ref(alias: &str, field: &str) -> String {
        format!("{}.{}", quote_identifier(alias), quote_identifier(field))
    }
}
