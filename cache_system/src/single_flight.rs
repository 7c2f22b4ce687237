//! Single-flight layer
//!
//! Concurrent misses on one key are serialized behind a per-key gate: the first
//! caller runs the producer, the others wait and then read the freshly cached value.

use crate::errors::{CacheError, ComputeError};
use crate::store::{CacheStore, CacheValue};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Wraps a cache store with per-key call coalescing
pub struct SingleFlight<S> {
    inner: S,
    gates: DashMap<String, Arc<Mutex<()>>>,
    enabled: bool,
}

impl<S: Debug> Debug for SingleFlight<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("inner", &self.inner)
            .field("enabled", &self.enabled)
            .field("in_flight", &self.gates.len())
            .finish()
    }
}

impl<S: CacheStore> SingleFlight<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gates: DashMap::new(),
            enabled: true,
        }
    }

    /// Pass-through wrapper, for configurations that opt out of coalescing
    pub fn disabled(inner: S) -> Self {
        Self {
            enabled: false,
            ..Self::new(inner)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of keys with a caller currently inside or waiting at the gate
    pub fn in_flight(&self) -> usize {
        self.gates.len()
    }
}

/// Holds a reference to a key's gate; the gate leaves the map with its last holder,
/// including callers whose future was dropped mid-flight.
struct GateTicket<'a> {
    gates: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
    gate: Option<Arc<Mutex<()>>>,
}

impl<'a> GateTicket<'a> {
    fn acquire(gates: &'a DashMap<String, Arc<Mutex<()>>>, key: &'a str) -> Self {
        let gate = gates.entry(key.to_string()).or_default().clone();
        Self {
            gates,
            key,
            gate: Some(gate),
        }
    }

    fn gate(&self) -> Arc<Mutex<()>> {
        self.gate.clone().unwrap_or_default()
    }
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            drop(gate);
            self.gates
                .remove_if(self.key, |_, gate| Arc::strong_count(gate) == 1);
        }
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for SingleFlight<S> {
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
        if !self.enabled {
            return self.inner.get_or_compute(key, ttl, producer).await;
        }

        let ticket = GateTicket::acquire(&self.gates, key);
        let _turn = ticket.gate().lock_owned().await;
        self.inner.get_or_compute(key, ttl, producer).await
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.inner.remove_by_prefix(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
