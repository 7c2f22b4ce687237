//! PostgreSQL data source
//!
//! Rows are read and written as `jsonb`, so any serde entity with a table mapping
//! can be served without generated SQL.

mod entity;
pub mod sql;
mod source;

pub use entity::{PgEntity, Relation, RelationKind};
pub use source::PgDataSource;
