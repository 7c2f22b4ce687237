//! Error types for cache operations
//!
//! This module defines all error types that can occur
//! during cache operations and Redis interactions.

use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(#[from] redis::RedisError),

    #[error("Connection pool error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache operation timeout after {0} ms")]
    Timeout(u64),

    #[error("Invalid TTL value: {0:?}")]
    InvalidTtl(std::time::Duration),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("General cache error: {0}")]
    General(String),
}

/// Outcome of a failed `get_or_compute` call
///
/// `Producer` carries the error of the value producer untouched; such values are never
/// cached. `Cache` reports a failure of the cache layer itself, raised before the
/// producer was invoked.
#[derive(Debug)]
pub enum ComputeError<E> {
    Cache(CacheError),
    Producer(E),
}

impl<E> ComputeError<E> {
    pub fn is_cache_failure(&self) -> bool {
        matches!(self, ComputeError::Cache(_))
    }
}

impl<E> From<CacheError> for ComputeError<E> {
    fn from(err: CacheError) -> Self {
        ComputeError::Cache(err)
    }
}
