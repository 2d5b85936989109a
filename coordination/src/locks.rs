//! # Lock Manager
//!
//! Named, time-bounded mutual-exclusion leases over the coordination store.
//! A lease moves through `Idle -> Acquiring -> Held -> {Released | Expired}`;
//! acquisition is a single atomic `SET NX EX`, release a server-side
//! compare-and-delete on the owner token, so a holder whose lease expired and
//! was re-acquired by another party can never delete the new owner's key.
//!
//! There is no FIFO fairness among waiters: acquisition order is a race
//! decided by the store. Exponential backoff with jitter reduces starvation
//! and thundering-herd retries but does not eliminate them. When the deadline
//! elapses the caller proceeds *without* the lock (liveness over strict
//! exclusion); the guard reports that through [`LockGuard::is_held`].

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::Rng;
use uuid::Uuid;

use crate::store::{StoreBackend, LOCK_PREFIX};

/// Hard cap on the backoff between acquisition attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Upper bound of the random jitter added to each backoff step, in ms.
const JITTER_MS: u64 = 100;

/// Tunables for a single lock acquisition.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Maximum lease lifetime; the store reaps the key if the holder crashes
    /// without releasing.
    pub ttl: Duration,
    /// Wall-clock budget for acquisition attempts before giving up and
    /// proceeding without exclusivity.
    pub timeout: Duration,
    /// Initial delay between attempts, doubled on every retry.
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Where an acquisition ended up. `Idle` and `Acquiring` are transient phases
/// inside [`LockManager::acquire`]; a guard is only ever observed in one of
/// the states below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// The lease is held by this guard.
    Held,
    /// The acquisition deadline elapsed; the caller runs without exclusivity.
    Unheld,
    /// The lease was released by this guard.
    Released,
    /// Release found another owner's token: the lease expired while held and
    /// was re-acquired. Expected after TTL races, not an error.
    Expired,
}

/// Acquires and releases named leases against the selected store backend.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn StoreBackend>,
    degraded: bool,
}

impl LockManager {
    pub(crate) fn new(store: Arc<dyn StoreBackend>, degraded: bool) -> Self {
        Self { store, degraded }
    }

    /// True when locks only exclude within this process (in-process backend).
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Acquires the lease named `name`, retrying with exponential backoff and
    /// jitter until the deadline in `opts.timeout` elapses. Always returns a
    /// guard; check [`LockGuard::is_held`] to learn whether exclusivity was
    /// actually obtained. The guard releases on drop, on every exit path.
    pub fn acquire(&self, name: &str, opts: &LockOptions) -> LockGuard {
        let key = format!("{LOCK_PREFIX}{name}");
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + opts.timeout;
        let mut attempt: u32 = 0;
        let mut store_warned = false;

        loop {
            match self.store.try_set_if_absent(&key, &token, opts.ttl) {
                Ok(true) => {
                    debug!("acquired lock {name}");
                    return LockGuard {
                        store: Arc::clone(&self.store),
                        key,
                        token,
                        state: LockState::Held,
                    };
                }
                Ok(false) => {}
                Err(e) => {
                    // Logged once per acquisition; each attempt fails fast.
                    if !store_warned {
                        warn!("store error while acquiring lock {name}: {e}");
                        store_warned = true;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "could not acquire lock {name} within {:?}; proceeding without exclusivity",
                    opts.timeout
                );
                return LockGuard {
                    store: Arc::clone(&self.store),
                    key,
                    token,
                    state: LockState::Unheld,
                };
            }

            let backoff = opts
                .retry_delay
                .checked_mul(1u32 << attempt.min(20))
                .unwrap_or(MAX_RETRY_DELAY);
            let jitter = Duration::from_millis(rand::rng().random_range(0..=JITTER_MS));
            let delay = (backoff + jitter).min(MAX_RETRY_DELAY).min(deadline - now);
            thread::sleep(delay);
            attempt += 1;
        }
    }

    /// Runs `f` under the named lease. The guard is passed in so the closure
    /// can inspect [`LockGuard::is_held`] when it cares about best-effort mode.
    pub fn with_lock<T>(
        &self,
        name: &str,
        opts: &LockOptions,
        f: impl FnOnce(&LockGuard) -> T,
    ) -> T {
        let guard = self.acquire(name, opts);
        f(&guard)
    }
}

/// RAII lease handle. Dropping the guard releases the lease via
/// compare-and-delete on the owner token, so release after a TTL-expiry race
/// is a harmless no-op for the new owner.
pub struct LockGuard {
    store: Arc<dyn StoreBackend>,
    key: String,
    token: String,
    state: LockState,
}

impl LockGuard {
    /// True while this guard holds the lease.
    pub fn is_held(&self) -> bool {
        self.state == LockState::Held
    }

    /// Current lifecycle state of the lease.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// The lock name this guard was acquired for.
    pub fn name(&self) -> &str {
        self.key.strip_prefix(LOCK_PREFIX).unwrap_or(&self.key)
    }

    /// Releases the lease now instead of at drop, reporting the final state.
    pub fn release(mut self) -> LockState {
        self.release_inner();
        self.state
    }

    fn release_inner(&mut self) {
        if self.state != LockState::Held {
            return;
        }
        match self.store.compare_and_delete(&self.key, &self.token) {
            Ok(true) => {
                debug!("released lock {}", self.name());
                self.state = LockState::Released;
            }
            Ok(false) => {
                debug!(
                    "lock {} expired and was re-acquired; release skipped",
                    self.name()
                );
                self.state = LockState::Expired;
            }
            Err(e) => {
                // The TTL will reap the key; nothing more to do here.
                warn!("failed to release lock {}: {e}", self.name());
                self.state = LockState::Released;
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
