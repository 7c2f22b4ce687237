//! Redis-backed cache store
//!
//! Values are stored as JSON strings with `SET EX`; namespace removal scans the
//! keyspace for the prefix and deletes the matches.

use crate::errors::{CacheError, ComputeError};
use crate::store::{validate_request, CacheStore, CacheValue, InvalidationEpoch};
use async_trait::async_trait;
use config::CacheConfig;
use redis::{AsyncCommands, Client};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Redis cache store with a lazily opened multiplexed connection
#[derive(Clone)]
pub struct RedisCacheStore {
    client: Arc<Client>,
    connection_timeout: Duration,
    connection: Arc<RwLock<Option<redis::aio::MultiplexedConnection>>>,
    epoch: Arc<InvalidationEpoch>,
}

impl Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection_status = match self.connection.try_read() {
            Ok(connection) if connection.is_some() => "connected",
            Ok(_) => "no_connection",
            Err(_) => "busy",
        };

        f.debug_struct("RedisCacheStore")
            .field("connection_timeout", &self.connection_timeout)
            .field("connected", &connection_status)
            .finish()
    }
}

impl RedisCacheStore {
    /// Create a store for the configured Redis URL; no connection is opened yet
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.redis_url.as_str())?;

        Ok(Self {
            client: Arc::new(client),
            connection_timeout: config.connection_timeout(),
            connection: Arc::new(RwLock::new(None)),
            epoch: Arc::new(InvalidationEpoch::default()),
        })
    }

    /// Get or open the shared Redis connection
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        if let Some(connection) = self.connection.read().await.as_ref() {
            return Ok(connection.clone());
        }

        let mut slot = self.connection.write().await;
        if slot.is_none() {
            let timeout_ms = self.connection_timeout.as_millis() as u64;
            let connection = tokio::time::timeout(
                self.connection_timeout,
                self.client.get_multiplexed_async_connection(),
            )
            .await
            .map_err(|_| CacheError::Timeout(timeout_ms))??;
            *slot = Some(connection);
        }

        slot.as_ref()
            .cloned()
            .ok_or_else(|| CacheError::Connection("Failed to get connection from pool".into()))
    }

    /// Forget the current connection so the next call reconnects
    async fn reset_connection(&self) {
        *self.connection.write().await = None;
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<String, CacheError> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }

    async fn read_entry(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.get_connection().await?;
        let cached: redis::RedisResult<Option<String>> = conn.get(key).await;
        match cached {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_io_error() || err.is_connection_dropped() {
                    self.reset_connection().await;
                }
                Err(err.into())
            }
        }
    }

    /// Write an entry, then take it back out if a prefix removal in this process
    /// advanced the epoch past `observed_epoch` meanwhile. Returns whether it stayed.
    ///
    /// Best effort: removals issued by other processes are not observed, and a
    /// reader may see the entry between the write and the delete.
    async fn store_unless_invalidated(
        &self,
        key: &str,
        json: &str,
        ttl: Duration,
        observed_epoch: u64,
    ) -> Result<bool, CacheError> {
        let mut conn = self.get_connection().await?;
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, json, seconds).await?;

        if self.epoch.unchanged_since(observed_epoch) {
            return Ok(true);
        }
        let _: u64 = conn.del(key).await?;
        tracing::debug!(key, "invalidation landed during write, entry removed");
        Ok(false)
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally
pub fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 4);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheStore for RedisCacheStore {
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

        if let Some(json) = self.read_entry(key).await? {
            tracing::trace!(key, "redis cache hit");
            return serde_json::from_str(&json).map_err(|e| ComputeError::Cache(e.into()));
        }

        tracing::trace!(key, "redis cache miss");
        let observed_epoch = self.epoch.current();
        let value = producer().await.map_err(ComputeError::Producer)?;

        if !self.epoch.unchanged_since(observed_epoch) {
            tracing::debug!(key, "invalidation raced with producer, value not cached");
            return Ok(value);
        }

        let written = match serde_json::to_string(&value) {
            Ok(json) => self.store_unless_invalidated(key, &json, ttl, observed_epoch).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = written {
            tracing::warn!(key, error = %err, "redis cache write failed, value returned uncached");
        }

        Ok(value)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.epoch.advance();

        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.get_connection().await?;
        let keys: Vec<String> = conn.keys(&pattern).await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: u64 = conn.del(keys).await?;
        tracing::debug!(prefix, deleted, "redis cache prefix removed");
        Ok(deleted)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::CacheBackendKind;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("app.Classroom."), "app.Classroom.");
        assert_eq!(escape_glob("a*b?c[d]"), "a\\*b\\?c\\[d\\]");
        assert_eq!(escape_glob("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_new_does_not_connect() {
        let config = CacheConfig::new(CacheBackendKind::Redis, 60, "app".to_string())
            .with_redis_url("redis://127.0.0.1:1");
        let store = RedisCacheStore::new(&config).unwrap();
        assert!(format!("{:?}", store).contains("no_connection"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = CacheConfig::new(CacheBackendKind::Redis, 60, "app".to_string())
            .with_redis_url("not a url");
        assert!(RedisCacheStore::new(&config).is_err());
    }

    fn live_store() -> Option<RedisCacheStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let config = CacheConfig::new(CacheBackendKind::Redis, 60, "app".to_string()).with_redis_url(url);
        RedisCacheStore::new(&config).ok()
    }

    #[tokio::test]
    async fn test_write_after_invalidation_is_removed() {
        let Some(store) = live_store() else {
            eprintln!("REDIS_URL not set, skipping Redis test");
            return;
        };
        let key = "app.RaceItem.select_list";
        let observed = store.epoch.current();
        store.remove_by_prefix("app.RaceItem.").await.unwrap();

        let kept = store
            .store_unless_invalidated(key, "[1,2]", Duration::from_secs(30), observed)
            .await
            .unwrap();
        assert!(!kept);
        assert_eq!(store.read_entry(key).await.unwrap(), None);

        let observed = store.epoch.current();
        let kept = store
            .store_unless_invalidated(key, "[1,2]", Duration::from_secs(30), observed)
            .await
            .unwrap();
        assert!(kept);
        assert_eq!(store.read_entry(key).await.unwrap().as_deref(), Some("[1,2]"));
        store.remove_by_prefix("app.RaceItem.").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_cache_failure() {
        let config = CacheConfig::new(CacheBackendKind::Redis, 60, "app".to_string())
            .with_redis_url("redis://127.0.0.1:1")
            .with_connection_timeout(200);
        let store = RedisCacheStore::new(&config).unwrap();

        let result: Result<i32, ComputeError<std::convert::Infallible>> = store
            .get_or_compute("app.Item.list", Duration::from_secs(5), || async { Ok(1) })
            .await;
        assert!(matches!(result, Err(ComputeError::Cache(_))));
    }
}
