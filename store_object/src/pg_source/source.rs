//! PostgreSQL unit-of-work data source

use super::entity::PgEntity;
use super::sql::{self, bind_json_param, Statement};
use crate::errors::RepositoryError;
use crate::id_type::KeyValue;
use crate::query_builder::{Includes, ListQuery, Page, PageRequest};
use crate::traits::repository::{require_entities, require_key, Repository};
use crate::traits::tracking::{ChangeTracker, PendingChange, TrackingMode};
use crate::DbPool;
use async_trait::async_trait;
use serde_json::Value;

/// Session over one PostgreSQL table; writes run in a single transaction on commit
#[derive(Debug)]
pub struct PgDataSource<T> {
    pool: DbPool,
    tracker: ChangeTracker<T>,
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: Vec<Value>,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = bind_json_param!(query, param);
    }
    query
}

fn bind_all_scalar<'q, O>(
    mut query: sqlx::query::QueryScalar<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    params: Vec<Value>,
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    for param in params {
        query = bind_json_param!(query, param);
    }
    query
}

impl<T: PgEntity> PgDataSource<T> {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            tracker: ChangeTracker::new(),
        }
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn fetch_rows(&self, statement: Statement, operation: &str) -> Result<Vec<T>, RepositoryError> {
        tracing::trace!(entity = T::kind(), operation, sql = %statement.sql, "postgres read");
        let rows: Vec<Value> = bind_all_scalar(sqlx::query_scalar::<_, Value>(&statement.sql), statement.params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(T::kind(), operation, e))?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(RepositoryError::from))
            .collect()
    }

    fn attach_rows(&self, rows: &[T]) -> Result<(), RepositoryError> {
        if self.tracker.mode() == TrackingMode::Tracking {
            for row in rows {
                let version = sql::version_of::<T>(&serde_json::to_value(row)?);
                self.tracker.attach(row, version);
            }
        }
        Ok(())
    }

    fn check_includes(includes: &Includes) -> Result<(), RepositoryError> {
        includes.validate()?;
        for path in includes.iter() {
            if T::relation(path).is_none() {
                return Err(RepositoryError::unknown_navigation(T::kind(), path));
            }
        }
        Ok(())
    }

    fn queue(&self, change: PendingChange<T>) {
        tracing::trace!(entity = T::kind(), change = change.kind(), key = %change.key(), "change queued");
        self.tracker.queue(change);
    }

    fn queue_update(&self, entity: T) -> Result<(), RepositoryError> {
        require_key(&entity.key())?;
        let expected_version = sql::version_of::<T>(&serde_json::to_value(&entity)?);
        self.queue(PendingChange::Update {
            entity,
            expected_version,
        });
        Ok(())
    }

    fn queue_delete(&self, key: KeyValue, expected_version: Option<u64>) -> Result<(), RepositoryError> {
        require_key(&key)?;
        self.queue(PendingChange::Delete {
            key,
            expected_version,
        });
        Ok(())
    }

    fn statement_for(change: &PendingChange<T>) -> Result<Statement, RepositoryError> {
        match change {
            PendingChange::Insert(entity) => sql::insert_statement::<T>(serde_json::to_value(entity)?),
            PendingChange::Update {
                entity,
                expected_version,
            } => sql::update_statement::<T>(&entity.key(), serde_json::to_value(entity)?, *expected_version),
            PendingChange::Delete {
                key,
                expected_version,
            } => sql::delete_statement::<T>(key, *expected_version),
        }
    }

    fn map_write_error(key: &KeyValue, error: sqlx::Error) -> RepositoryError {
        if let sqlx::Error::Database(db_error) = &error {
            if db_error.is_unique_violation() {
                return RepositoryError::duplicate_key(T::kind(), key);
            }
        }
        RepositoryError::database(T::kind(), "commit", error)
    }

    /// Run every change inside one transaction, reporting the key that failed.
    /// Returning early drops `tx`, which rolls it back.
    async fn execute_changes(&self, changes: &[PendingChange<T>]) -> Result<(), (RepositoryError, Option<KeyValue>)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| (RepositoryError::database(T::kind(), "begin", e), None))?;

        for change in changes {
            let key = change.key();
            let statement = Self::statement_for(change).map_err(|e| (e, Some(key.clone())))?;
            let result = bind_all(sqlx::query(&statement.sql), statement.params)
                .execute(&mut *tx)
                .await
                .map_err(|e| (Self::map_write_error(&key, e), Some(key.clone())))?;

            if result.rows_affected() == 0 {
                let error = RepositoryError::concurrency_conflict(
                    T::kind(),
                    &key,
                    format!("{} affected no rows", change.kind()),
                );
                return Err((error, Some(key)));
            }
        }

        tx.commit()
            .await
            .map_err(|e| (RepositoryError::database(T::kind(), "commit", e), None))
    }

    /// Read the current state of a row after a failed commit, for the log
    async fn diagnostic_requery(&self, key: &KeyValue) -> Option<Value> {
        let statement = sql::find_by_key_statement::<T>(key).ok()?;
        bind_all_scalar(sqlx::query_scalar::<_, Value>(&statement.sql), statement.params)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
    }
}

#[async_trait]
impl<T: PgEntity> Repository for PgDataSource<T> {
    type Entity = T;

    async fn select_list(&self, query: &ListQuery) -> Result<Vec<T>, RepositoryError> {
        query.validate()?;
        Self::check_includes(query.includes())?;
        let statement = sql::select_statement::<T>(query, None, None)?;
        let rows = self.fetch_rows(statement, "select_list").await?;
        self.attach_rows(&rows)?;
        Ok(rows)
    }

    async fn select_page(&self, query: &ListQuery, page: &PageRequest) -> Result<Page<T>, RepositoryError> {
        query.validate()?;
        page.validate()?;
        Self::check_includes(query.includes())?;

        let total_count = self.count(query).await?;
        let statement = sql::select_statement::<T>(query, Some(page), None)?;
        let items = self.fetch_rows(statement, "select_page").await?;
        self.attach_rows(&items)?;

        Ok(Page {
            items,
            page_index: page.page_index,
            page_size: page.page_size,
            total_count,
        })
    }

    async fn find(&self, query: &ListQuery) -> Result<Option<T>, RepositoryError> {
        query.validate_with_predicate()?;
        Self::check_includes(query.includes())?;
        let statement = sql::select_statement::<T>(query, None, Some(1))?;
        let rows = self.fetch_rows(statement, "find").await?;
        self.attach_rows(&rows)?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_key(&self, key: &KeyValue) -> Result<Option<T>, RepositoryError> {
        require_key(key)?;
        if let Some(attached) = self.tracker.attached(key) {
            return Ok(Some(attached));
        }

        let statement = sql::find_by_key_statement::<T>(key)?;
        let found = self.fetch_rows(statement, "find_by_key").await?.into_iter().next();
        if let Some(entity) = &found {
            // Key lookups go through the identity map regardless of the tracking mode
            let version = sql::version_of::<T>(&serde_json::to_value(entity)?);
            self.tracker.attach(entity, version);
        }
        Ok(found)
    }

    async fn count(&self, query: &ListQuery) -> Result<u64, RepositoryError> {
        query.validate()?;
        let statement = sql::count_statement::<T>(query)?;
        let total: i64 = bind_all_scalar(sqlx::query_scalar::<_, i64>(&statement.sql), statement.params)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(T::kind(), "count", e))?;
        Ok(u64::try_from(total).unwrap_or_default())
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
        let expected_version = sql::version_of::<T>(&serde_json::to_value(&entity)?);
        self.queue_delete(entity.key(), expected_version)
    }

    async fn delete_many(&self, entities: Vec<T>) -> Result<(), RepositoryError> {
        require_entities("entities", &entities)?;
        for entity in entities {
            self.delete(entity).await?;
        }
        Ok(())
    }

    async fn delete_by_key(&self, key: &KeyValue) -> Result<(), RepositoryError> {
        let expected_version = self.tracker.attached_version(key);
        self.queue_delete(key.clone(), expected_version)
    }

    async fn commit(&self) -> Result<usize, RepositoryError> {
        let changes = self.tracker.pending_snapshot();
        if changes.is_empty() {
            return Ok(0);
        }

        match self.execute_changes(&changes).await {
            Ok(()) => {
                // Row versions moved in the database, so written entities must be re-read
                for change in &changes {
                    self.tracker.detach(&change.key());
                }
                self.tracker.complete(changes.len());
                tracing::info!(entity = T::kind(), changes = changes.len(), "postgres commit applied");
                Ok(changes.len())
            }
            Err((error, key)) => {
                let discarded = self.tracker.discard();
                if let Some(key) = key {
                    self.tracker.detach(&key);
                    let current = self.diagnostic_requery(&key).await;
                    tracing::warn!(
                        entity = T::kind(),
                        key = %key,
                        current = ?current,
                        discarded,
                        error = %error,
                        "postgres commit rolled back"
                    );
                } else {
                    tracing::warn!(entity = T::kind(), discarded, error = %error, "postgres commit rolled back");
                }
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
