//! Shared in-memory table
//!
//! Rows live behind an `Arc`, so every session opened over the same table sees
//! the same committed state. Each row carries a version bumped on every commit
//! that touches it.

use crate::entity::Entity;
use crate::id_type::KeyValue;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
pub(crate) struct StoredRow<T> {
    pub(crate) entity: T,
    pub(crate) version: u64,
}

pub(crate) type Rows<T> = BTreeMap<KeyValue, StoredRow<T>>;

/// Committed rows of one entity kind, ordered by primary key
#[derive(Debug, Clone)]
pub struct InMemoryTable<T> {
    rows: Arc<RwLock<Rows<T>>>,
}

impl<T> Default for InMemoryTable<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<T: Entity> InMemoryTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-filled with committed rows at version 1
    pub fn with_rows(rows: impl IntoIterator<Item = T>) -> Self {
        let table = Self::new();
        table.seed(rows);
        table
    }

    /// Insert or replace committed rows directly, bypassing any session
    pub fn seed(&self, rows: impl IntoIterator<Item = T>) {
        let mut stored = self.write();
        for entity in rows {
            let version = stored.get(&entity.key()).map_or(1, |row| row.version + 1);
            stored.insert(entity.key(), StoredRow { entity, version });
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, key: &KeyValue) -> Option<T> {
        self.read().get(key).map(|row| row.entity.clone())
    }

    pub fn version_of(&self, key: &KeyValue) -> Option<u64> {
        self.read().get(key).map(|row| row.version)
    }

    pub fn keys(&self) -> Vec<KeyValue> {
        self.read().keys().cloned().collect()
    }

    // Critical sections never panic, so a poisoned lock still guards consistent rows
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Rows<T>> {
        self.rows.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Rows<T>> {
        self.rows.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
