//! Change tracking
//!
//! A data source session keeps an identity map of the entities it has attached
//! and a buffer of writes waiting for `commit`.

use crate::entity::Entity;
use crate::id_type::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Whether reads attach their results to the session's identity map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingMode {
    #[default]
    Tracking,
    NoTracking,
}

/// A buffered write
#[derive(Debug, Clone)]
pub enum PendingChange<T> {
    Insert(T),
    /// Update guarded by the row version observed when the write was queued
    Update { entity: T, expected_version: Option<u64> },
    Delete { key: KeyValue, expected_version: Option<u64> },
}

impl<T: Entity> PendingChange<T> {
    pub fn key(&self) -> KeyValue {
        match self {
            PendingChange::Insert(entity) => entity.key(),
            PendingChange::Update { entity, .. } => entity.key(),
            PendingChange::Delete { key, .. } => key.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingChange::Insert(_) => "insert",
            PendingChange::Update { .. } => "update",
            PendingChange::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedEntry<T> {
    entity: T,
    version: Option<u64>,
}

/// Identity map plus pending-change buffer for one session
#[derive(Debug)]
pub struct ChangeTracker<T> {
    mode: Mutex<TrackingMode>,
    attached: Mutex<HashMap<KeyValue, TrackedEntry<T>>>,
    pending: Mutex<Vec<PendingChange<T>>>,
}

impl<T> Default for ChangeTracker<T> {
    fn default() -> Self {
        Self {
            mode: Mutex::new(TrackingMode::default()),
            attached: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }
}

// The guarded sections never panic, so a poisoned lock still holds consistent data
fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Entity> ChangeTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> TrackingMode {
        *lock(&self.mode)
    }

    pub fn set_mode(&self, mode: TrackingMode) {
        *lock(&self.mode) = mode;
    }

    /// Attach an entity; an already attached instance wins
    pub fn attach(&self, entity: &T, version: Option<u64>) {
        lock(&self.attached)
            .entry(entity.key())
            .or_insert_with(|| TrackedEntry {
                entity: entity.clone(),
                version,
            });
    }

    /// Attach read results when the session is in tracking mode
    pub fn attach_if_tracking<'a>(&self, entities: impl IntoIterator<Item = (&'a T, Option<u64>)>) {
        if self.mode() == TrackingMode::Tracking {
            for (entity, version) in entities {
                self.attach(entity, version);
            }
        }
    }

    pub fn attached(&self, key: &KeyValue) -> Option<T> {
        lock(&self.attached).get(key).map(|e| e.entity.clone())
    }

    pub fn attached_version(&self, key: &KeyValue) -> Option<u64> {
        lock(&self.attached).get(key).and_then(|e| e.version)
    }

    pub fn set_version(&self, key: &KeyValue, version: u64) {
        if let Some(entry) = lock(&self.attached).get_mut(key) {
            entry.version = Some(version);
        }
    }

    pub fn is_tracked(&self, key: &KeyValue) -> bool {
        lock(&self.attached).contains_key(key)
    }

    pub fn detach(&self, key: &KeyValue) -> bool {
        lock(&self.attached).remove(key).is_some()
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.attached).len()
    }

    pub fn queue(&self, change: PendingChange<T>) {
        lock(&self.pending).push(change);
    }

    pub fn has_pending(&self) -> bool {
        !lock(&self.pending).is_empty()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Copy of the buffered writes, left in place until the commit outcome is known
    pub fn pending_snapshot(&self) -> Vec<PendingChange<T>> {
        lock(&self.pending).clone()
    }

    /// Drop the first `count` buffered writes after they were persisted
    pub fn complete(&self, count: usize) {
        let mut pending = lock(&self.pending);
        let count = count.min(pending.len());
        pending.drain(..count);
    }

    /// Discard every buffered write and detach the entities they were about
    pub fn discard(&self) -> usize {
        let drained: Vec<PendingChange<T>> = lock(&self.pending).drain(..).collect();
        let mut attached = lock(&self.attached);
        for change in &drained {
            attached.remove(&change.key());
        }
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: i64,
        text: String,
    }

    impl Entity for Note {
        fn kind() -> &'static str {
            "Note"
        }

        fn key(&self) -> KeyValue {
            KeyValue::Numeric(self.id)
        }
    }

    fn note(id: i64) -> Note {
        Note {
            id,
            text: format!("note {}", id),
        }
    }

    #[test]
    fn test_attach_only_in_tracking_mode() {
        let tracker = ChangeTracker::new();
        let notes = [note(1), note(2)];

        tracker.set_mode(TrackingMode::NoTracking);
        tracker.attach_if_tracking(notes.iter().map(|n| (n, Some(1))));
        assert_eq!(tracker.tracked_count(), 0);

        tracker.set_mode(TrackingMode::Tracking);
        tracker.attach_if_tracking(notes.iter().map(|n| (n, Some(1))));
        assert_eq!(tracker.tracked_count(), 2);
        assert!(tracker.detach(&KeyValue::Numeric(1)));
        assert!(!tracker.detach(&KeyValue::Numeric(1)));
        assert_eq!(tracker.attached_version(&KeyValue::Numeric(2)), Some(1));
    }

    #[test]
    fn test_discard_detaches_pending_entities() {
        let tracker = ChangeTracker::new();
        tracker.attach(&note(1), None);
        tracker.queue(PendingChange::Insert(note(1)));
        tracker.queue(PendingChange::Delete {
            key: KeyValue::Numeric(9),
            expected_version: None,
        });

        assert!(tracker.has_pending());
        assert_eq!(tracker.discard(), 2);
        assert!(!tracker.has_pending());
        assert!(!tracker.is_tracked(&KeyValue::Numeric(1)));
    }

    #[test]
    fn test_complete_drops_persisted_prefix() {
        let tracker = ChangeTracker::new();
        tracker.queue(PendingChange::Insert(note(1)));
        tracker.queue(PendingChange::Insert(note(2)));
        tracker.complete(1);
        assert_eq!(tracker.pending_count(), 1);
        assert_eq!(tracker.pending_snapshot()[0].key(), KeyValue::Numeric(2));
    }
}
