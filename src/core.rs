//! Core CacheHaus functionality
//!
//! This module contains the `CacheHaus` coordinator: it turns an `AppConfig` into a
//! shared cache backend and an optional PostgreSQL pool, and hands out cached
//! repositories over them.

use cache_system::{CacheBackend, CacheParams, SingleFlight};
use config::AppConfig;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use store_object::{Entity, PgDataSource, PgEntity, Repository};

use crate::cached_repository::{CachedRepository, RepositoryCache};
use crate::errors::CacheHausError;

/// Store type every coordinator-built repository caches through
pub type SharedStore = SingleFlight<CacheBackend>;

/// Main CacheHaus coordinator owning the cache backend and database connection
#[derive(Debug)]
pub struct CacheHaus {
    config: AppConfig,
    cache: RepositoryCache<SharedStore>,
    pool: Option<PgPool>,
}

impl CacheHaus {
    /// Build the configured cache backend. No database connection is opened.
    pub fn new(config: AppConfig) -> Result<Self, CacheHausError> {
        config.validate()?;

        let backend = CacheBackend::from_config(&config.cache)?;
        let store = if config.repository.single_flight {
            SingleFlight::new(backend)
        } else {
            SingleFlight::disabled(backend)
        };
        let params = CacheParams::from_config(&config.cache)?;
        let cache = RepositoryCache::new(Arc::new(store), params)
            .with_fallback(config.repository.fallback_on_cache_error);

        tracing::info!(
            backend = ?config.cache.backend,
            prefix = %config.cache.key_prefix,
            ttl_seconds = config.cache.default_ttl_seconds,
            single_flight = config.repository.single_flight,
            "cachehaus initialized"
        );

        Ok(Self {
            config,
            cache,
            pool: None,
        })
    }

    /// Build the cache backend and connect the database when one is configured
    pub async fn connect(config: AppConfig) -> Result<Self, CacheHausError> {
        let mut haus = Self::new(config)?;
        if haus.config.database.is_some() {
            haus.connect_database().await?;
        }
        Ok(haus)
    }

    /// Load `AppConfig` from the environment and connect
    pub async fn from_env() -> Result<Self, CacheHausError> {
        Self::connect(AppConfig::load()?).await
    }

    /// Open the PostgreSQL pool described by the `[database]` section
    pub async fn connect_database(&mut self) -> Result<&PgPool, CacheHausError> {
        let config = self
            .config
            .database
            .as_ref()
            .ok_or(CacheHausError::DatabaseNotConfigured)?;
        let connection_string = config.connection_string();

        let mut pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds));

        // Set max lifetime if specified
        if config.max_lifetime_seconds > 0 {
            pool_options =
                pool_options.max_lifetime(Duration::from_secs(config.max_lifetime_seconds));
        }

        let pool = pool_options.connect(&connection_string).await?;
        tracing::info!(host = %config.host, database = %config.database, "database pool connected");
        Ok(self.pool.insert(pool))
    }

    /// Use an existing pool instead of connecting from config
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Get database pool reference
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Long-lived cache half, cheap to clone into other tasks
    pub fn repository_cache(&self) -> &RepositoryCache<SharedStore> {
        &self.cache
    }

    /// Wrap one data-source session in the shared cache
    pub fn wrap<S: Repository>(&self, source: S) -> CachedRepository<S, SharedStore> {
        self.cache.wrap(source)
    }

    /// Cached repository over a fresh PostgreSQL session
    pub fn pg_repository<T: PgEntity>(
        &self,
    ) -> Result<CachedRepository<PgDataSource<T>, SharedStore>, CacheHausError> {
        let pool = self.pool.clone().ok_or(CacheHausError::DatabaseNotConfigured)?;
        Ok(self.wrap(PgDataSource::new(pool)))
    }

    /// Drop every cached read of one entity kind
    pub async fn invalidate(&self, kind: &str) -> Result<u64, CacheHausError> {
        Ok(self.cache.invalidate_kind(kind).await?)
    }

    pub async fn invalidate_entity<E: Entity>(&self) -> Result<u64, CacheHausError> {
        Ok(self.cache.invalidate::<E>().await?)
    }

    /// Check cache backend and, when connected, database health
    pub async fn health_check(&self) -> Result<(), CacheHausError> {
        self.cache.store().inner().health_check().await?;
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").fetch_one(pool).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{CacheBackendKind, CacheConfig};

    #[test]
    fn test_new_builds_memory_backend() {
        let haus = CacheHaus::new(AppConfig::default()).unwrap();
        assert!(haus.repository_cache().store().is_enabled());
        assert!(haus.repository_cache().store().inner().as_memory().is_some());
        assert_eq!(haus.repository_cache().key_builder().prefix(), "cachehaus");
        assert!(haus.pool().is_none());
    }

    #[test]
    fn test_single_flight_follows_config() {
        let mut config = AppConfig::default();
        config.repository.single_flight = false;
        let haus = CacheHaus::new(config).unwrap();
        assert!(!haus.repository_cache().store().is_enabled());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AppConfig {
            cache: CacheConfig::new(CacheBackendKind::Memory, 0, "school".to_string()),
            ..AppConfig::default()
        };
        assert!(matches!(CacheHaus::new(config), Err(CacheHausError::Config(_))));
    }

    #[tokio::test]
    async fn test_database_required_for_pg_access() {
        let mut haus = CacheHaus::new(AppConfig::default()).unwrap();
        assert!(matches!(
            haus.connect_database().await,
            Err(CacheHausError::DatabaseNotConfigured)
        ));
        haus.health_check().await.unwrap();
    }
}
