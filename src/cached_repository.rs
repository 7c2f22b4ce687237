//! Read-through caching decorator
//!
//! `RepositoryCache` is the long-lived half: the cache store, key builder, TTL and
//! failure policy, shared by every request. `CachedRepository` is the per-session
//! half: it wraps one unit-of-work data source and mirrors its contract.

use crate::key_builder::{KeyBuilder, KeyParams};
use cache_system::{CacheError, CacheParams, CacheStore, CacheValue, ComputeError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use store_object::traits::repository::{require_entities, require_key};
use store_object::{
    Entity, KeyValue, ListQuery, Page, PageRequest, Repository, RepositoryError, TrackingMode,
};
use tokio_util::sync::CancellationToken;

/// Shared cache settings for wrapping data-source sessions
pub struct RepositoryCache<C> {
    store: Arc<C>,
    keys: KeyBuilder,
    ttl: Duration,
    fallback_on_cache_error: bool,
}

impl<C> Clone for RepositoryCache<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            ttl: self.ttl,
            fallback_on_cache_error: self.fallback_on_cache_error,
        }
    }
}

impl<C: CacheStore> fmt::Debug for RepositoryCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryCache")
            .field("backend", &self.store.backend_name())
            .field("prefix", &self.keys.prefix())
            .field("ttl", &self.ttl)
            .field("fallback_on_cache_error", &self.fallback_on_cache_error)
            .finish()
    }
}

impl<C: CacheStore> RepositoryCache<C> {
    pub fn new(store: Arc<C>, params: CacheParams) -> Self {
        Self {
            store,
            keys: KeyBuilder::new(params.prefix),
            ttl: params.ttl,
            fallback_on_cache_error: true,
        }
    }

    /// Whether reads fall back to the data source when the cache itself fails
    pub fn with_fallback(mut self, fallback_on_cache_error: bool) -> Self {
        self.fallback_on_cache_error = fallback_on_cache_error;
        self
    }

    pub fn store(&self) -> &Arc<C> {
        &self.store
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Wrap one data-source session
    pub fn wrap<S: Repository>(&self, source: S) -> CachedRepository<S, C> {
        CachedRepository::new(source, self.clone())
    }

    /// Drop every cached read of an entity kind
    pub async fn invalidate<E: Entity>(&self) -> Result<u64, CacheError> {
        self.invalidate_kind(E::kind()).await
    }

    pub async fn invalidate_kind(&self, kind: &str) -> Result<u64, CacheError> {
        let prefix = self.keys.invalidation_prefix(kind);
        let removed = self.store.remove_by_prefix(&prefix).await?;
        tracing::info!(namespace = %self.keys.namespace(kind), removed, "cache namespace invalidated");
        Ok(removed)
    }
}

/// Caching decorator over one data-source session.
///
/// Reads go through the cache, writes go straight to the source, and `commit`
/// clears the entity's namespace before delegating.
pub struct CachedRepository<S, C> {
    source: S,
    cache: RepositoryCache<C>,
    cancellation: Option<CancellationToken>,
}

impl<S: Repository, C: CacheStore> fmt::Debug for CachedRepository<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRepository")
            .field("entity", &S::Entity::kind())
            .field("cache", &self.cache)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

impl<S: Repository, C: CacheStore> CachedRepository<S, C> {
    pub fn new(source: S, cache: RepositoryCache<C>) -> Self {
        source.set_tracking_mode(TrackingMode::NoTracking);
        Self {
            source,
            cache,
            cancellation: None,
        }
    }

    /// Abort in-flight reads with `Cancelled` once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    pub fn cache(&self) -> &RepositoryCache<C> {
        &self.cache
    }

    fn kind() -> &'static str {
        S::Entity::kind()
    }

    fn key(&self, operation: &str, params: &KeyParams<'_>) -> String {
        self.cache.keys.build(Self::kind(), operation, params)
    }

    async fn cancellable<V, Fut>(&self, future: Fut) -> Result<V, RepositoryError>
    where
        Fut: Future<Output = Result<V, RepositoryError>>,
    {
        match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(RepositoryError::Cancelled),
                result = future => result,
            },
            None => future.await,
        }
    }

    /// Serve `key` from the cache, running `producer` against the source on a miss
    async fn read_through<V, F, Fut>(&self, operation: &str, key: String, producer: F) -> Result<V, RepositoryError>
    where
        V: CacheValue,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<V, RepositoryError>> + Send,
    {
        self.source.set_tracking_mode(TrackingMode::NoTracking);
        crate::debug_log!(entity = Self::kind(), operation, key = %key, "cached read");

        let lookup = async {
            self.cache
                .store
                .get_or_compute(&key, self.cache.ttl, || producer())
                .await
                .map_err(Some)
        };
        let outcome = match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(None),
                result = lookup => result,
            },
            None => lookup.await,
        };

        match outcome {
            Ok(value) => Ok(value),
            Err(None) => {
                tracing::debug!(entity = Self::kind(), operation, "cached read cancelled");
                Err(RepositoryError::Cancelled)
            }
            Err(Some(ComputeError::Producer(error))) => Err(error),
            Err(Some(ComputeError::Cache(error))) if self.cache.fallback_on_cache_error => {
                tracing::warn!(
                    entity = Self::kind(),
                    operation,
                    backend = self.cache.store.backend_name(),
                    error = %error,
                    "cache unavailable, reading from data source"
                );
                self.cancellable(producer()).await
            }
            Err(Some(ComputeError::Cache(error))) => Err(RepositoryError::cache(operation, error)),
        }
    }
}

#[async_trait::async_trait]
impl<S: Repository, C: CacheStore> Repository for CachedRepository<S, C> {
    type Entity = S::Entity;

    async fn select_list(&self, query: &ListQuery) -> Result<Vec<S::Entity>, RepositoryError> {
        query.validate()?;
        let key = self.key("select_list", &KeyParams::query(query));
        self.read_through("select_list", key, || self.source.select_list(query))
            .await
    }

    async fn select_page(
        &self,
        query: &ListQuery,
        page: &PageRequest,
    ) -> Result<Page<S::Entity>, RepositoryError> {
        query.validate()?;
        page.validate()?;
        let key = self.key("select_page", &KeyParams::query(query).with_page(page));
        self.read_through("select_page", key, || self.source.select_page(query, page))
            .await
    }

    async fn find(&self, query: &ListQuery) -> Result<Option<S::Entity>, RepositoryError> {
        query.validate_with_predicate()?;
        let key = self.key("find", &KeyParams::query(query));
        self.read_through("find", key, || self.source.find(query)).await
    }

    async fn find_by_key(&self, key: &KeyValue) -> Result<Option<S::Entity>, RepositoryError> {
        require_key(key)?;
        // The session's own copy may hold uncommitted state; it never enters the shared cache
        if self.source.is_tracked(key) {
            crate::debug_log!(entity = Self::kind(), key = %key, "key lookup served by session");
            return self.cancellable(self.source.find_by_key(key)).await;
        }
        let cache_key = self.key("find_by_key", &KeyParams::new().with_key(key));

        let found = self
            .read_through("find_by_key", cache_key, || self.source.find_by_key(key))
            .await;

        if self.source.detach(key) {
            crate::trace_log!(entity = Self::kind(), key = %key, "detached after key lookup");
        }
        found
    }

    async fn count(&self, query: &ListQuery) -> Result<u64, RepositoryError> {
        query.validate()?;
        let key = self.key("count", &KeyParams::new().with_predicate(query.predicate()));
        self.read_through("count", key, || self.source.count(query)).await
    }

    async fn insert(&self, entity: S::Entity) -> Result<(), RepositoryError> {
        require_key(&entity.key())?;
        self.source.insert(entity).await
    }

    async fn insert_many(&self, entities: Vec<S::Entity>) -> Result<(), RepositoryError> {
        require_entities("entities", &entities)?;
        self.source.insert_many(entities).await
    }

    async fn update(&self, entity: S::Entity) -> Result<(), RepositoryError> {
        require_key(&entity.key())?;
        self.source.update(entity).await
    }

    async fn update_many(&self, entities: Vec<S::Entity>) -> Result<(), RepositoryError> {
        require_entities("entities", &entities)?;
        self.source.update_many(entities).await
    }

    async fn delete(&self, entity: S::Entity) -> Result<(), RepositoryError> {
        require_key(&entity.key())?;
        self.source.delete(entity).await
    }

    async fn delete_many(&self, entities: Vec<S::Entity>) -> Result<(), RepositoryError> {
        require_entities("entities", &entities)?;
        self.source.delete_many(entities).await
    }

    async fn delete_by_key(&self, key: &KeyValue) -> Result<(), RepositoryError> {
        require_key(key)?;
        self.source.delete_by_key(key).await
    }

    /// Invalidate the namespace, then commit. If invalidation fails nothing is
    /// committed and the pending changes stay queued.
    async fn commit(&self) -> Result<usize, RepositoryError> {
        self.cache
            .invalidate_kind(Self::kind())
            .await
            .map_err(|e| RepositoryError::cache("commit", e))?;

        let changes = self.source.commit().await?;
        tracing::info!(entity = Self::kind(), changes, "cached repository commit");
        Ok(changes)
    }

    fn discard_changes(&self) -> usize {
        self.source.discard_changes()
    }

    fn has_pending_changes(&self) -> bool {
        self.source.has_pending_changes()
    }

    fn tracking_mode(&self) -> TrackingMode {
        self.source.tracking_mode()
    }

    fn set_tracking_mode(&self, mode: TrackingMode) {
        if mode == TrackingMode::Tracking {
            tracing::debug!(entity = Self::kind(), "tracking mode request ignored, cached reads are never tracked");
        }
        self.source.set_tracking_mode(TrackingMode::NoTracking);
    }

    fn is_tracked(&self, key: &KeyValue) -> bool {
        self.source.is_tracked(key)
    }

    fn detach(&self, key: &KeyValue) -> bool {
        self.source.detach(key)
    }

    fn tracked_count(&self) -> usize {
        self.source.tracked_count()
    }
}
