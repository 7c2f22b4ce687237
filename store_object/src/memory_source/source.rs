//! In-memory unit-of-work data source
//!
//! One `InMemoryDataSource` is one session over an `InMemoryTable`: reads see
//! committed rows, writes are buffered and applied atomically by `commit` after
//! every change has been checked against the row versions.

use super::table::{InMemoryTable, Rows, StoredRow};
use crate::entity::Entity;
use crate::errors::RepositoryError;
use crate::id_type::KeyValue;
use crate::query_builder::evaluate::{compare_values, lookup};
use crate::query_builder::{Includes, ListQuery, Page, PageRequest, SortDirection, SortSpec};
use crate::traits::repository::{require_entities, require_key, Repository};
use crate::traits::tracking::{ChangeTracker, PendingChange, TrackingMode};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicUsize,
    writes: AtomicUsize,
    commits: AtomicUsize,
}

/// Session over an in-memory table
#[derive(Debug)]
pub struct InMemoryDataSource<T> {
    table: InMemoryTable<T>,
    tracker: ChangeTracker<T>,
    latency: Option<Duration>,
    counters: Counters,
}

/// Matching row with its serialized form, used for sorting
struct Candidate<T> {
    entity: T,
    version: u64,
    json: Value,
}

impl<T: Entity> InMemoryDataSource<T> {
    pub fn new(table: InMemoryTable<T>) -> Self {
        Self {
            table,
            tracker: ChangeTracker::new(),
            latency: None,
            counters: Counters::default(),
        }
    }

    /// Delay every read and commit, standing in for a network round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn table(&self) -> &InMemoryTable<T> {
        &self.table
    }

    /// Number of read operations that reached this source
    pub fn read_count(&self) -> usize {
        self.counters.reads.load(AtomicOrdering::SeqCst)
    }

    /// Number of write operations queued on this source
    pub fn write_count(&self) -> usize {
        self.counters.writes.load(AtomicOrdering::SeqCst)
    }

    /// Number of commit calls, successful or not
    pub fn commit_count(&self) -> usize {
        self.counters.commits.load(AtomicOrdering::SeqCst)
    }

    /// Total calls of any kind
    pub fn call_count(&self) -> usize {
        self.read_count() + self.write_count() + self.commit_count()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn begin_read(&self, operation: &str) {
        self.counters.reads.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::trace!(entity = T::kind(), operation, "in-memory read");
        self.simulate_latency().await;
    }

    fn check_includes(includes: &Includes) -> Result<(), RepositoryError> {
        includes.validate()?;
        for path in includes.iter() {
            if !T::has_navigation(path) {
                return Err(RepositoryError::unknown_navigation(T::kind(), path));
            }
        }
        Ok(())
    }

    /// Drop navigation values the query did not ask for
    fn shape(mut entity: T, includes: &Includes) -> T {
        for navigation in T::navigations() {
            if !includes.contains(navigation) {
                entity.clear_navigation(navigation);
            }
        }
        entity
    }

    fn matching_rows(&self, query: &ListQuery) -> Result<Vec<Candidate<T>>, RepositoryError> {
        let rows = self.table.read();
        let mut matches = Vec::new();
        for row in rows.values() {
            let json = serde_json::to_value(&row.entity)?;
            if query.predicate().is_none_or(|p| p.matches(&json)) {
                matches.push(Candidate {
                    entity: row.entity.clone(),
                    version: row.version,
                    json,
                });
            }
        }
        Ok(matches)
    }

    fn finish_rows(&self, candidates: Vec<Candidate<T>>, includes: &Includes) -> Vec<T> {
        self.tracker
            .attach_if_tracking(candidates.iter().map(|c| (&c.entity, Some(c.version))));
        candidates
            .into_iter()
            .map(|c| Self::shape(c.entity, includes))
            .collect()
    }

    fn queue(&self, change: PendingChange<T>) {
        self.counters.writes.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::trace!(entity = T::kind(), change = change.kind(), key = %change.key(), "change queued");
        self.tracker.queue(change);
    }

    /// Version the write is guarded by: the attached version, else the committed one
    fn expected_version(&self, key: &KeyValue) -> Option<u64> {
        self.tracker
            .attached_version(key)
            .or_else(|| self.table.version_of(key))
    }

    fn queue_update(&self, entity: T) -> Result<(), RepositoryError> {
        require_key(&entity.key())?;
        let expected_version = self.expected_version(&entity.key());
        self.queue(PendingChange::Update {
            entity,
            expected_version,
        });
        Ok(())
    }

    fn queue_delete(&self, key: KeyValue) -> Result<(), RepositoryError> {
        require_key(&key)?;
        let expected_version = self.expected_version(&key);
        self.queue(PendingChange::Delete {
            key,
            expected_version,
        });
        Ok(())
    }

    /// Apply changes to a working copy of the rows, failing on the first conflict
    fn apply(rows: &Rows<T>, changes: &[PendingChange<T>]) -> Result<(Rows<T>, BTreeSet<KeyValue>), (RepositoryError, KeyValue)> {
        let mut working = rows.clone();
        let mut touched = BTreeSet::new();

        for change in changes {
            let key = change.key();
            match change {
                PendingChange::Insert(entity) => {
                    if working.contains_key(&key) {
                        return Err((RepositoryError::duplicate_key(T::kind(), &key), key));
                    }
                    working.insert(
                        key.clone(),
                        StoredRow {
                            entity: entity.clone(),
                            version: 0,
                        },
                    );
                }
                PendingChange::Update {
                    entity,
                    expected_version,
                } => {
                    let conflict = |message: &str| {
                        Err((RepositoryError::concurrency_conflict(T::kind(), &key, message), key.clone()))
                    };
                    match working.get_mut(&key) {
                        None => return conflict("row no longer exists"),
                        Some(row) if !touched.contains(&key) && Some(row.version) != *expected_version => {
                            return conflict("row was modified by another session");
                        }
                        Some(row) => row.entity = entity.clone(),
                    }
                }
                PendingChange::Delete {
                    expected_version, ..
                } => {
                    let stale = match working.get(&key) {
                        None => Some("row no longer exists"),
                        Some(row) if !touched.contains(&key) && Some(row.version) != *expected_version => {
                            Some("row was modified by another session")
                        }
                        Some(_) => None,
                    };
                    if let Some(message) = stale {
                        return Err((RepositoryError::concurrency_conflict(T::kind(), &key, message), key));
                    }
                    working.remove(&key);
                }
            }
            touched.insert(key);
        }

        for key in &touched {
            if let Some(row) = working.get_mut(key) {
                row.version = rows.get(key).map_or(1, |original| original.version + 1);
            }
        }

        Ok((working, touched))
    }
}

/// Compare two serialized rows by the sort specs; nulls sort last ascending
fn compare_rows(a: &Value, b: &Value, sort: &[SortSpec]) -> Ordering {
    for spec in sort {
        let ordering = match (lookup(a, &spec.field), lookup(b, &spec.field)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        let ordering = match spec.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl<T: Entity> Repository for InMemoryDataSource<T> {
    type Entity = T;

    async fn select_list(&self, query: &ListQuery) -> Result<Vec<T>, RepositoryError> {
        query.validate()?;
        Self::check_includes(query.includes())?;
        self.begin_read("select_list").await;

        let candidates = self.matching_rows(query)?;
        Ok(self.finish_rows(candidates, query.includes()))
    }

    async fn select_page(&self, query: &ListQuery, page: &PageRequest) -> Result<Page<T>, RepositoryError> {
        query.validate()?;
        page.validate()?;
        Self::check_includes(query.includes())?;
        self.begin_read("select_page").await;

        let mut candidates = self.matching_rows(query)?;
        candidates.sort_by(|a, b| compare_rows(&a.json, &b.json, &page.sort));
        let total_count = candidates.len() as u64;

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let size = usize::try_from(page.page_size).unwrap_or(usize::MAX);
        let window: Vec<Candidate<T>> = candidates.into_iter().skip(offset).take(size).collect();

        Ok(Page {
            items: self.finish_rows(window, query.includes()),
            page_index: page.page_index,
            page_size: page.page_size,
            total_count,
        })
    }

    async fn find(&self, query: &ListQuery) -> Result<Option<T>, RepositoryError> {
        query.validate_with_predicate()?;
        Self::check_includes(query.includes())?;
        self.begin_read("find").await;

        let mut candidates = self.matching_rows(query)?;
        candidates.truncate(1);
        Ok(self.finish_rows(candidates, query.includes()).pop())
    }

    async fn find_by_key(&self, key: &KeyValue) -> Result<Option<T>, RepositoryError> {
        require_key(key)?;
        self.begin_read("find_by_key").await;

        if let Some(attached) = self.tracker.attached(key) {
            return Ok(Some(Self::shape(attached, &Includes::new())));
        }

        let found = self.table.read().get(key).cloned();
        Ok(found.map(|row| {
            // Key lookups go through the identity map regardless of the tracking mode
            self.tracker.attach(&row.entity, Some(row.version));
            Self::shape(row.entity, &Includes::new())
        }))
    }

    async fn count(&self, query: &ListQuery) -> Result<u64, RepositoryError> {
        query.validate()?;
        self.begin_read("count").await;
        Ok(self.matching_rows(query)?.len() as u64)
    }

    async fn insert(&self, entity: T) -> Result<(), RepositoryError> {
        require_key(&entity.key())?;
        self.tracker.attach(&entity, None);
        self.queue(PendingChange::Insert(entity));
        Ok(())
    }

    async fn insert_many(&self, entities: Vec<T>) -> Result<(), RepositoryError> {
        require_entities("entities", &entities)?;
        for entity in entities {
            self.insert(entity).await?;
        }
        Ok(())
    }

    async fn update(&self, entity: T) -> Result<(), RepositoryError> {
        self.queue_update(entity)
    }

    async fn update_many(&self, entities: Vec<T>) -> Result<(), RepositoryError> {
        require_entities("entities", &entities)?;
        entities.into_iter().try_for_each(|e| self.queue_update(e))
    }

    async fn delete(&self, entity: T) -> Result<(), RepositoryError> {
        self.queue_delete(entity.key())
    }

    async fn delete_many(&self, entities: Vec<T>) -> Result<(), RepositoryError> {
        require_entities("entities", &entities)?;
        entities.into_iter().try_for_each(|e| self.queue_delete(e.key()))
    }

    async fn delete_by_key(&self, key: &KeyValue) -> Result<(), RepositoryError> {
        self.queue_delete(key.clone())
    }

    async fn commit(&self) -> Result<usize, RepositoryError> {
        self.counters.commits.fetch_add(1, AtomicOrdering::SeqCst);
        let changes = self.tracker.pending_snapshot();
        if changes.is_empty() {
            return Ok(0);
        }
        self.simulate_latency().await;

        let outcome = {
            let mut rows = self.table.write();
            match Self::apply(&rows, &changes) {
                Ok((working, touched)) => {
                    *rows = working;
                    Ok(touched
                        .into_iter()
                        .filter_map(|key| rows.get(&key).map(|row| (key, row.version)))
                        .collect::<Vec<_>>())
                }
                Err(failure) => Err(failure),
            }
        };

        match outcome {
            Ok(versions) => {
                for (key, version) in &versions {
                    self.tracker.set_version(key, *version);
                }
                for change in &changes {
                    if let PendingChange::Delete { key, .. } = change {
                        self.tracker.detach(key);
                    }
                }
                self.tracker.complete(changes.len());
                tracing::info!(entity = T::kind(), changes = changes.len(), "in-memory commit applied");
                Ok(changes.len())
            }
            Err((error, key)) => {
                let discarded = self.tracker.discard();
                self.tracker.detach(&key);
                tracing::warn!(
                    entity = T::kind(),
                    key = %key,
                    current_version = ?self.table.version_of(&key),
                    discarded,
                    error = %error,
                    "in-memory commit rolled back"
                );
                Err(error)
            }
        }
    }

    fn discard_changes(&self) -> usize {
        self.tracker.discard()
    }

    fn has_pending_changes(&self) -> bool {
        self.tracker.has_pending()
    }

    fn tracking_mode(&self) -> TrackingMode {
        self.tracker.mode()
    }

    fn set_tracking_mode(&self, mode: TrackingMode) {
        self.tracker.set_mode(mode);
    }

    fn is_tracked(&self, key: &KeyValue) -> bool {
        self.tracker.is_tracked(key)
    }

    fn detach(&self, key: &KeyValue) -> bool {
        self.tracker.detach(key)
    }

    fn tracked_count(&self) -> usize {
        self.tracker.tracked_count()
    }
}
