//! Convenience re-exports for common CacheHaus usage
//!
//! ```rust
//! use cachehaus::prelude::*;
//! ```

// Core CacheHaus components
pub use crate::cached_repository::{CachedRepository, RepositoryCache};
pub use crate::core::CacheHaus;
pub use crate::errors::CacheHausError;
pub use crate::key_builder::{KeyBuilder, KeyParams};

// Re-export centralized config
pub use config::{AppConfig, DatabaseConfig, RepositoryConfig};

// Data sources, entities and query shapes
pub use store_object::prelude::*;

// Cache stores
pub use cache_system::prelude::*;

// Common external dependencies
pub use anyhow;
pub use tokio;
pub use tokio_util::sync::CancellationToken;
