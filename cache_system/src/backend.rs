//! Configured cache backend
//!
//! Chooses between the in-process store and Redis from `CacheConfig` and forwards
//! both store operations to the chosen one.

use crate::errors::{CacheError, ComputeError};
use crate::memory::MemoryCacheStore;
use crate::redis_store::RedisCacheStore;
use crate::store::{CacheStore, CacheValue};
use async_trait::async_trait;
use config::{CacheBackendKind, CacheConfig};
use std::future::Future;
use std::time::Duration;

#[derive(Debug)]
pub enum CacheBackend {
    Memory(MemoryCacheStore),
    Redis(RedisCacheStore),
}

impl CacheBackend {
    /// Build the backend named by `config.backend`
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let backend = match config.backend {
            CacheBackendKind::Memory => Self::Memory(MemoryCacheStore::new()),
            CacheBackendKind::Redis => Self::Redis(RedisCacheStore::new(config)?),
        };
        tracing::debug!(backend = backend.backend_name(), "cache backend created");
        Ok(backend)
    }

    pub fn as_memory(&self) -> Option<&MemoryCacheStore> {
        match self {
            Self::Memory(store) => Some(store),
            Self::Redis(_) => None,
        }
    }

    /// Check that the backend can serve requests; the memory store always can
    pub async fn health_check(&self) -> Result<(), CacheError> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Redis(store) => store.ping().await.map(|_| ()),
        }
    }
}

#[async_trait]
impl CacheStore for CacheBackend {
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
        match self {
            Self::Memory(store) => store.get_or_compute(key, ttl, producer).await,
            Self::Redis(store) => store.get_or_compute(key, ttl, producer).await,
        }
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        match self {
            Self::Memory(store) => store.remove_by_prefix(prefix).await,
            Self::Redis(store) => store.remove_by_prefix(prefix).await,
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(store) => store.backend_name(),
            Self::Redis(store) => store.backend_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_backend() {
        let memory = CacheBackend::from_config(&CacheConfig::default()).unwrap();
        assert_eq!(memory.backend_name(), "memory");
        assert!(memory.as_memory().is_some());

        let redis_config = CacheConfig::new(CacheBackendKind::Redis, 60, "app".to_string())
            .with_redis_url("redis://127.0.0.1:1");
        let redis = CacheBackend::from_config(&redis_config).unwrap();
        assert_eq!(redis.backend_name(), "redis");
        assert!(redis.as_memory().is_none());
    }

    #[tokio::test]
    async fn test_memory_backend_delegates() {
        let backend = CacheBackend::from_config(&CacheConfig::default()).unwrap();
        let value: Result<String, ComputeError<std::convert::Infallible>> = backend
            .get_or_compute("app.Item.find", Duration::from_secs(5), || async {
                Ok("stored".to_string())
            })
            .await;
        assert_eq!(value.unwrap(), "stored");
        assert_eq!(backend.remove_by_prefix("app.Item.").await.unwrap(), 1);
        assert!(backend.health_check().await.is_ok());
    }
}
