//! Convenience re-exports for common store-object usage

// Core traits
pub use crate::entity::Entity;
pub use crate::traits::{Repository, TrackingMode};

// Error types
pub use crate::errors::RepositoryError;

// Data sources
pub use crate::memory_source::{InMemoryDataSource, InMemoryTable};
pub use crate::pg_source::{PgDataSource, PgEntity, Relation};

// Key type
pub use crate::id_type::KeyValue;

// Query shapes
pub use crate::query_builder::{
    Includes, ListQuery, Page, PageRequest, Predicate, SortDirection, SortSpec,
};

// Common external dependencies that are frequently used
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use sqlx::PgPool;
pub use uuid::Uuid;
