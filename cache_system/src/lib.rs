//! Cache system for repository read caching
//!
//! This crate provides the `CacheStore` contract with in-process and Redis
//! backends, a single-flight layer and per-repository parameters.

pub mod backend;
pub mod errors;
pub mod memory;
pub mod params;
pub mod prelude;
pub mod redis_store;
pub mod single_flight;
pub mod store;

// Re-export centralized config
pub use config::{CacheBackendKind, CacheConfig};

pub use backend::CacheBackend;
pub use errors::{CacheError, ComputeError};
pub use memory::{CacheStats, MemoryCacheStore};
pub use params::CacheParams;
pub use redis_store::RedisCacheStore;
pub use single_flight::SingleFlight;
pub use store::{CacheStore, CacheValue};
