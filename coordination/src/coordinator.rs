//! # Coordinator
//!
//! The per-process context object. Built once at startup, it probes the
//! store exactly once, pins the backend for the life of the process and hands
//! out the component views (locks, cursors, cache, health, file coordination)
//! that all share the single backend. Passing this by handle replaces the
//! older global-singleton pattern while keeping "one store connection per
//! process" semantics.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::cache::Cache;
use crate::config::StoreConfig;
use crate::cursors::CursorStore;
use crate::files::{FileCoordinator, LockNamespacePolicy};
use crate::health::HealthRegistry;
use crate::locks::LockManager;
use crate::store::{
    unix_now, MemoryStore, RedisStore, StoreBackend, CURSOR_PREFIX, LOCK_PREFIX,
};

/// Point-in-time view of the coordination layer, for monitors and health
/// endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationSnapshot {
    /// Whether the remote store currently answers.
    pub connected: bool,
    /// Whether the layer was constructed in standalone (in-process) mode.
    pub fallback_mode: bool,
    /// Services with a live health record.
    pub active_services: Vec<String>,
    /// Leases currently held somewhere.
    pub active_locks: usize,
    /// Cursor records currently stored (including local-only fallbacks).
    pub active_cursors: usize,
    /// Unix seconds when the snapshot was taken.
    pub timestamp: f64,
}

/// Per-process coordination context.
pub struct Coordinator {
    store: Arc<dyn StoreBackend>,
    cursors: Arc<CursorStore>,
    degraded: bool,
}

impl Coordinator {
    /// Connects to the store described by `config`. The probe happens here
    /// and never again: an unreachable server pins the layer to the
    /// in-process backend for the life of this coordinator, with reduced
    /// guarantees surfaced through `is_degraded()`.
    pub fn connect(config: &StoreConfig) -> Self {
        match RedisStore::open(&config.url()) {
            Ok(store) => {
                if store.probe() {
                    info!(
                        "connected to coordination store at {}:{}/{}",
                        config.host, config.port, config.db
                    );
                    return Self::with_backend(Arc::new(store), false);
                }
                warn!(
                    "coordination store at {}:{} did not answer; operating in standalone mode",
                    config.host, config.port
                );
            }
            Err(e) => {
                warn!("failed to open coordination store client: {e}; operating in standalone mode");
            }
        }
        Self::with_backend(Arc::new(MemoryStore::new()), true)
    }

    /// Connects using [`StoreConfig::from_env`].
    pub fn from_env() -> Self {
        Self::connect(&StoreConfig::from_env())
    }

    /// Builds an in-process coordinator directly, without probing anything.
    /// Used by offline tooling and tests.
    pub fn standalone() -> Self {
        Self::with_backend(Arc::new(MemoryStore::new()), true)
    }

    fn with_backend(store: Arc<dyn StoreBackend>, degraded: bool) -> Self {
        let cursors = Arc::new(CursorStore::new(Arc::clone(&store), degraded));
        Self {
            store,
            cursors,
            degraded,
        }
    }

    /// True when coordination only holds within this process.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Lease acquisition over the shared backend.
    pub fn locks(&self) -> LockManager {
        LockManager::new(Arc::clone(&self.store), self.degraded)
    }

    /// The shared cursor store.
    pub fn cursors(&self) -> Arc<CursorStore> {
        Arc::clone(&self.cursors)
    }

    /// A cache view over the shared backend.
    pub fn cache(&self) -> Cache {
        Cache::new(Arc::clone(&self.store), self.degraded)
    }

    /// A health registry view over the shared backend.
    pub fn health(&self) -> HealthRegistry {
        HealthRegistry::new(Arc::clone(&self.store), self.degraded)
    }

    /// File coordination with the historical split lock namespaces.
    pub fn file_coordinator(&self) -> FileCoordinator {
        self.file_coordinator_with_policy(LockNamespacePolicy::default())
    }

    /// File coordination with an explicit namespace policy.
    pub fn file_coordinator_with_policy(&self, policy: LockNamespacePolicy) -> FileCoordinator {
        FileCoordinator::new(self.locks(), Arc::clone(&self.cursors), policy)
    }

    /// Takes a point-in-time snapshot of the layer: connectivity, active
    /// services, and lease/cursor counts.
    pub fn snapshot(&self) -> CoordinationSnapshot {
        let connected = !self.degraded && self.store.probe();
        let active_locks = self
            .store
            .keys_with_prefix(LOCK_PREFIX)
            .map(|keys| keys.len())
            .unwrap_or(0);
        let active_cursors = self
            .store
            .keys_with_prefix(CURSOR_PREFIX)
            .map(|keys| keys.len())
            .unwrap_or(0)
            + self.cursors.local_len();

        CoordinationSnapshot {
            connected,
            fallback_mode: self.degraded,
            active_services: self.health().list_active(),
            active_locks,
            active_cursors,
            timestamp: unix_now(),
        }
    }
}
