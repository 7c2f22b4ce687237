//! In-process cache store
//!
//! Entries are JSON snapshots kept in an ordered map, which turns prefix removal
//! into a single range scan.

use crate::errors::{CacheError, ComputeError};
use crate::store::{validate_request, CacheStore, CacheValue, InvalidationEpoch};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Counters {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    skipped_stores: AtomicU64,
    removed: AtomicU64,
}

/// Point-in-time copy of the store counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of `get_or_compute` calls
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    /// Produced values written to the store
    pub stores: u64,
    /// Produced values not written because an invalidation raced with the producer
    pub skipped_stores: u64,
    /// Entries dropped by prefix removal or expiry
    pub removed: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Thread-safe in-memory cache store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<String, MemoryEntry>>,
    epoch: InvalidationEpoch,
    counters: Counters,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            skipped_stores: self.counters.skipped_stores.load(Ordering::Relaxed),
            removed: self.counters.removed.load(Ordering::Relaxed),
        }
    }

    /// Whether a live (non-expired) entry exists for `key`
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.read_entries()
            .map(|entries| entries.get(key).is_some_and(|entry| !entry.is_expired(now)))
            .unwrap_or(false)
    }

    /// Number of stored entries, expired ones included until they are purged
    pub fn len(&self) -> usize {
        self.read_entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently stored, in order
    pub fn keys(&self) -> Vec<String> {
        self.read_entries()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.write_entries()?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = (before - entries.len()) as u64;
        self.counters.removed.fetch_add(purged, Ordering::Relaxed);
        Ok(purged)
    }

    fn read_entries(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MemoryEntry>>, CacheError> {
        self.entries
            .read()
            .map_err(|_| CacheError::General("memory cache lock poisoned".to_string()))
    }

    fn write_entries(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MemoryEntry>>, CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::General("memory cache lock poisoned".to_string()))
    }

    fn lookup(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.read_entries()?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.write_entries()?;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            self.counters.removed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(None)
    }

    fn store_entry(&self, key: &str, value: Value, ttl: Duration, observed_epoch: u64) {
        let mut entries = match self.write_entries() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(key, error = %err, "memory cache write skipped");
                return;
            }
        };

        // Checked under the write lock so a concurrent prefix removal is either fully
        // before or fully after this insert.
        if !self.epoch.unchanged_since(observed_epoch) {
            self.counters.skipped_stores.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "invalidation raced with producer, value not cached");
            return;
        }

        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.counters.stores.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
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
        Fut: Future<Output = Result<T, E>> + Send,
    {
        validate_request(key, ttl)?;
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        if let Some(cached) = self.lookup(key)? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key, "memory cache hit");
            return serde_json::from_value(cached).map_err(|e| ComputeError::Cache(e.into()));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key, "memory cache miss");

        let observed_epoch = self.epoch.current();
        let value = producer().await.map_err(ComputeError::Producer)?;

        match serde_json::to_value(&value) {
            Ok(snapshot) => self.store_entry(key, snapshot, ttl, observed_epoch),
            Err(err) => tracing::warn!(key, error = %err, "value not cacheable, returned uncached"),
        }

        Ok(value)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.write_entries()?;
        self.epoch.advance();

        let doomed: Vec<String> = entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            entries.remove(key);
        }

        let removed = doomed.len() as u64;
        self.counters.removed.fetch_add(removed, Ordering::Relaxed);
        tracing::debug!(prefix, removed, "memory cache prefix removed");
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(60);

    async fn compute(store: &MemoryCacheStore, key: &str, value: i32, calls: &AtomicUsize) -> i32 {
        store
            .get_or_compute(key, TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(value)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let store = MemoryCacheStore::new();
        let calls = AtomicUsize::new(0);

        assert_eq!(compute(&store, "app.Item.list", 7, &calls).await, 7);
        assert_eq!(compute(&store, "app.Item.list", 8, &calls).await, 7);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = store.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_absent_value_is_cacheable() {
        let store = MemoryCacheStore::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Option<String> = store
                .get_or_compute("app.Item.find", TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(None)
                })
                .await
                .unwrap();
            assert!(value.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_producer_error_is_not_cached() {
        let store = MemoryCacheStore::new();

        let result: Result<i32, _> = store
            .get_or_compute("app.Item.list", TTL, || async { Err("boom") })
            .await;
        assert!(matches!(result, Err(ComputeError::Producer("boom"))));
        assert!(!store.contains_key("app.Item.list"));

        let calls = AtomicUsize::new(0);
        assert_eq!(compute(&store, "app.Item.list", 3, &calls).await, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_by_prefix_only_touches_namespace() {
        let store = MemoryCacheStore::new();
        let calls = AtomicUsize::new(0);

        compute(&store, "app.Class.select_list", 1, &calls).await;
        compute(&store, "app.Classroom.select_list", 2, &calls).await;
        compute(&store, "app.Classroom.find_by_key.key=1", 3, &calls).await;
        compute(&store, "app.Teacher.select_list", 4, &calls).await;

        let removed = store.remove_by_prefix("app.Classroom.").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.keys(),
            vec!["app.Class.select_list".to_string(), "app.Teacher.select_list".to_string()]
        );
        assert_eq!(store.stats().removed, 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let store = MemoryCacheStore::new();
        let calls = AtomicUsize::new(0);
        let short = Duration::from_millis(20);

        for expected_calls in [1, 1] {
            store
                .get_or_compute("app.Item.list", short, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(1)
                })
                .await
                .unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.contains_key("app.Item.list"));

        compute(&store, "app.Item.list", 1, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryCacheStore::new();
        store
            .get_or_compute("a", Duration::from_millis(5), || async { Ok::<_, Infallible>(1) })
            .await
            .unwrap();
        store
            .get_or_compute("b", TTL, || async { Ok::<_, Infallible>(2) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_cache_failures() {
        let store = MemoryCacheStore::new();

        let empty_key: Result<i32, ComputeError<Infallible>> = store
            .get_or_compute("", TTL, || async { Ok(1) })
            .await;
        assert!(matches!(empty_key, Err(ComputeError::Cache(CacheError::InvalidKey(_)))));

        let zero_ttl: Result<i32, ComputeError<Infallible>> = store
            .get_or_compute("k", Duration::ZERO, || async { Ok(1) })
            .await;
        assert!(matches!(zero_ttl, Err(ComputeError::Cache(CacheError::InvalidTtl(_)))));
        assert_eq!(store.stats().lookups, 0);
    }

    #[tokio::test]
    async fn test_cancelled_producer_leaves_no_entry() {
        let store = MemoryCacheStore::new();

        let slow = store.get_or_compute("app.Item.list", TTL, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Infallible>(1)
        });
        let outcome = tokio::time::timeout(Duration::from_millis(20), slow).await;

        assert!(outcome.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_skips_store() {
        let store = Arc::new(MemoryCacheStore::new());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_compute("app.Item.select_list", TTL, || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok::<_, Infallible>(vec![1, 2, 3])
                    })
                    .await
                    .unwrap()
            })
        };

        started_rx.await.unwrap();
        store.remove_by_prefix("app.Item.").await.unwrap();
        release_tx.send(()).unwrap();

        assert_eq!(reader.await.unwrap(), vec![1, 2, 3]);
        assert!(!store.contains_key("app.Item.select_list"));
        assert_eq!(store.stats().skipped_stores, 1);
    }
}
