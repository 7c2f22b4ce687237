//! Repository contract
//!
//! The read/write surface shared by data sources and by the cached decorator, so
//! either can stand in for the other.

use crate::entity::Entity;
use crate::errors::RepositoryError;
use crate::id_type::KeyValue;
use crate::query_builder::{ListQuery, Page, PageRequest, Predicate};
use crate::traits::tracking::TrackingMode;
use async_trait::async_trait;

/// Data access over one entity kind within one unit of work.
///
/// Writes are buffered until `commit`. Sessions are not meant to be shared between
/// concurrent writers.
#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: Entity;

    /// Every row matching the query's predicate, with the requested navigations
    async fn select_list(&self, query: &ListQuery) -> Result<Vec<Self::Entity>, RepositoryError>;

    /// One page of the matching rows
    async fn select_page(
        &self,
        query: &ListQuery,
        page: &PageRequest,
    ) -> Result<Page<Self::Entity>, RepositoryError>;

    /// First row matching the query's predicate; the predicate is required
    async fn find(&self, query: &ListQuery) -> Result<Option<Self::Entity>, RepositoryError>;

    /// Row with the given primary key
    async fn find_by_key(&self, key: &KeyValue) -> Result<Option<Self::Entity>, RepositoryError>;

    /// Number of rows matching the query's predicate
    async fn count(&self, query: &ListQuery) -> Result<u64, RepositoryError>;

    async fn select_all(&self) -> Result<Vec<Self::Entity>, RepositoryError> {
        self.select_list(&ListQuery::new()).await
    }

    async fn select_where(&self, predicate: Predicate) -> Result<Vec<Self::Entity>, RepositoryError> {
        self.select_list(&ListQuery::filtered(predicate)).await
    }

    async fn insert(&self, entity: Self::Entity) -> Result<(), RepositoryError>;

    async fn insert_many(&self, entities: Vec<Self::Entity>) -> Result<(), RepositoryError>;

    async fn update(&self, entity: Self::Entity) -> Result<(), RepositoryError>;

    async fn update_many(&self, entities: Vec<Self::Entity>) -> Result<(), RepositoryError>;

    async fn delete(&self, entity: Self::Entity) -> Result<(), RepositoryError>;

    async fn delete_many(&self, entities: Vec<Self::Entity>) -> Result<(), RepositoryError>;

    async fn delete_by_key(&self, key: &KeyValue) -> Result<(), RepositoryError>;

    /// Persist every buffered write atomically, returning how many were applied
    async fn commit(&self) -> Result<usize, RepositoryError>;

    /// Drop buffered writes, returning how many were dropped
    fn discard_changes(&self) -> usize;

    fn has_pending_changes(&self) -> bool;

    fn tracking_mode(&self) -> TrackingMode;

    fn set_tracking_mode(&self, mode: TrackingMode);

    fn is_tracked(&self, key: &KeyValue) -> bool;

    /// Remove an entity from the identity map, returning whether it was attached
    fn detach(&self, key: &KeyValue) -> bool;

    fn tracked_count(&self) -> usize;
}

/// Reject an empty primary key
pub fn require_key(key: &KeyValue) -> Result<(), RepositoryError> {
    if key.is_empty() {
        return Err(RepositoryError::invalid_argument(
            "key",
            "primary key value cannot be empty",
        ));
    }
    Ok(())
}

/// Reject an empty batch or a batch holding an entity without a key
pub fn require_entities<T: Entity>(argument: &str, entities: &[T]) -> Result<(), RepositoryError> {
    if entities.is_empty() {
        return Err(RepositoryError::invalid_argument(
            argument,
            "entity collection cannot be empty",
        ));
    }
    entities.iter().try_for_each(|e| require_key(&e.key()))
}
