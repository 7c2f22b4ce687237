//! # CacheHaus
//!
//! A read-through caching decorator for data-access repositories: deterministic cache
//! keys for structurally variable queries, whole-namespace invalidation on commit and
//! tracking-safe reuse of a long-lived cache over short-lived unit-of-work sessions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cachehaus::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Classroom {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for Classroom {
//!     fn kind() -> &'static str {
//!         "Classroom"
//!     }
//!
//!     fn key(&self) -> KeyValue {
//!         KeyValue::Numeric(self.id)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let haus = CacheHaus::new(AppConfig::default())?;
//!     let table = InMemoryTable::with_rows([Classroom { id: 1, name: "Math".to_string() }]);
//!
//!     let classrooms = haus.wrap(InMemoryDataSource::new(table.clone()));
//!     let all = classrooms.select_all().await?;
//!     println!("{} classrooms", all.len());
//!
//!     classrooms.insert(Classroom { id: 2, name: "Art".to_string() }).await?;
//!     classrooms.commit().await?;
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod cached_repository;
pub mod core;
pub mod errors;
pub mod key_builder;
pub mod prelude;

// Re-export the main public types for convenience
pub use cached_repository::{CachedRepository, RepositoryCache};
pub use crate::core::{CacheHaus, SharedStore};
pub use errors::CacheHausError;
pub use key_builder::{KeyBuilder, KeyParams};

// Re-export centralized config
pub use config::{AppConfig, CacheBackendKind, CacheConfig, DatabaseConfig, RepositoryConfig};

// Re-export member crates
pub use cache_system;
pub use store_object;

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;
pub use tokio_util::sync::CancellationToken;
