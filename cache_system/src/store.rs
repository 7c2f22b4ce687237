//! The cache store contract
//!
//! Every backend exposes exactly two operations: a read-through `get_or_compute`
//! and a namespace-wide `remove_by_prefix`.

use crate::errors::{CacheError, ComputeError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Values that can live in a cache store.
///
/// Stores keep serialized snapshots, so every hit hands out a fresh, detached copy.
pub trait CacheValue: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Key/value store used by cached repositories.
///
/// Implementations must be safe for concurrent use. Dropping the future returned by
/// `get_or_compute` while the producer runs must leave no entry behind.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Return the value cached under `key`, or run `producer`, cache its value for
    /// `ttl` and return it.
    async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, ComputeError<E>>
    where
        T: CacheValue,
        E: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send;

    /// Remove every entry whose key starts with `prefix`, returning how many were removed
    async fn remove_by_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    /// Short backend name used in log lines
    fn backend_name(&self) -> &'static str;
}

/// Counter bumped by every prefix removal.
///
/// A producer that started before a removal may have read pre-removal data, so its
/// value is returned to the caller but not stored.
#[derive(Debug, Default)]
pub(crate) struct InvalidationEpoch(AtomicU64);

impl InvalidationEpoch {
    pub(crate) fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unchanged_since(&self, observed: u64) -> bool {
        self.current() == observed
    }
}

pub(crate) fn validate_request(key: &str, ttl: Duration) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("cache key cannot be empty".to_string()));
    }
    if ttl.is_zero() {
        return Err(CacheError::InvalidTtl(ttl));
    }
    Ok(())
}
