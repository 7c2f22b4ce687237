//! Store Object - data access contract for CacheHaus
//!
//! This crate provides the entity and repository traits, the query shapes every
//! read is described with, and two unit-of-work data sources: an in-memory one
//! and a PostgreSQL one.

pub mod entity;
pub mod errors;
pub mod id_type;
pub mod memory_source;
pub mod pg_source;
pub mod prelude;
pub mod query_builder;
pub mod traits;
pub mod validation;

pub use entity::Entity;
pub use errors::RepositoryError;
pub use id_type::KeyValue;
pub use memory_source::{InMemoryDataSource, InMemoryTable};
pub use pg_source::{PgDataSource, PgEntity, Relation, RelationKind};
pub use query_builder::{
    Includes, ListQuery, Page, PageRequest, Predicate, QueryOperator, SortDirection, SortSpec,
};
pub use traits::*;
pub use validation::{ValidatedFieldPath, ValidatedTableName, ValidationError};

use sqlx::PgPool;

pub type DbPool = PgPool;
