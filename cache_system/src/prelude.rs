//! Convenience re-exports for common cache-system usage

// Core cache system components
pub use crate::backend::CacheBackend;
pub use crate::errors::{CacheError, ComputeError};
pub use crate::memory::{CacheStats, MemoryCacheStore};
pub use crate::params::CacheParams;
pub use crate::redis_store::RedisCacheStore;
pub use crate::single_flight::SingleFlight;
pub use crate::store::{CacheStore, CacheValue};

// Re-export centralized config
pub use config::{CacheBackendKind, CacheConfig};

// Common external dependencies
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
