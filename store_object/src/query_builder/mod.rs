//! Query shapes
//!
//! Predicates, include lists, sorting and paging parameters shared by every
//! repository read.

pub mod evaluate;
pub mod filter;
pub mod includes;
pub mod list_query;
pub mod ordering;
pub mod pagination;
pub mod sql_generation;

#[cfg(test)]
mod tests;

pub use filter::{LogicalOperator, Predicate, QueryCondition, QueryOperator};
pub use includes::Includes;
pub use list_query::ListQuery;
pub use ordering::{SortDirection, SortSpec};
pub use pagination::{Page, PageRequest};
pub use sql_generation::SqlGenerator;
