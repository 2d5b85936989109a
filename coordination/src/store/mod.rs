//! # Coordination Store Client
//!
//! Capability surface over the shared key-value store. Two backends implement
//! the same contract: [`RedisStore`] against a live Redis server and
//! [`MemoryStore`] as the in-process stand-in used when the server is
//! unreachable (and by the test suite). The backend is chosen once at
//! construction and never re-probed mid-operation, so there is no window
//! between "checked connected" and "used connection".
//!
//! Backends fail fast: a call against an unreachable server returns a
//! [`StoreError`] immediately. Retry policy lives in the lock manager only.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Keyspace prefix for mutual-exclusion leases.
pub const LOCK_PREFIX: &str = "lock:";
/// Keyspace prefix for incremental read cursors.
pub const CURSOR_PREFIX: &str = "cursor:";
/// Keyspace prefix for service health records.
pub const HEALTH_PREFIX: &str = "health:";

#[derive(Debug, Error)]
/// # Store Error
///
/// Failures surfaced by a store backend. Upper layers absorb these into
/// booleans, `Option`s or fallback branches; they are never raised to callers
/// of the coordination API as hard errors.
pub enum StoreError {
    /// The underlying Redis command failed (connection refused, timeout,
    /// protocol error).
    #[error("redis command failed: {0}")]
    Backend(#[from] redis::RedisError),

    /// The store was unreachable when probed at construction.
    #[error("coordination store unavailable")]
    Unavailable,
}

/// Convenience alias for store operation results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic primitives every coordination backend must provide.
///
/// `compare_and_delete` must be atomic on the store side (a scripted
/// get-compare-delete, never a read followed by a delete) so a lease that
/// expired and was re-acquired by another owner is never clobbered by the
/// original holder's release.
pub trait StoreBackend: Send + Sync {
    /// Tests connectivity. Backends that cannot fail (in-process) return true.
    fn probe(&self) -> bool;

    /// `SET key value NX EX ttl`. Returns true when the key was absent and is
    /// now owned by the caller.
    fn try_set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Deletes `key` only while it still holds `expected`. Returns true when
    /// the key was deleted, false when the value no longer matched.
    fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Plain read of a string key.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Plain write of a string key, with an optional expiry.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Removes a key of any kind. Returns true when something was removed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Writes fields of a hash-map value, with an optional expiry on the key.
    fn hash_set(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> StoreResult<()>;

    /// Reads all fields of a hash-map value. An absent or empty hash is `None`.
    fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>>;

    /// Enumerates keys starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Publishes a payload on a channel. Returns the receiver count.
    fn publish(&self, channel: &str, payload: &str) -> StoreResult<u64>;
}

/// SHA-256 fingerprint of a resource identifier, hex encoded. Used to keep
/// store keys length-bounded and collision-resistant regardless of how long
/// the underlying file path is.
pub fn fingerprint(id: &str) -> String {
    hex::encode(Sha256::digest(id.as_bytes()))
}

/// Current Unix time in seconds, with sub-second precision. This is the
/// timestamp format persisted inside cursor and health records.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_hex() {
        let fp = fingerprint("/data/quotes/2025-08-24.csv");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint("/data/quotes/2025-08-24.csv"));
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(fp, fingerprint("/data/quotes/2025-08-25.csv"));
    }

    #[test]
    fn unix_now_advances() {
        let a = unix_now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(unix_now() > a);
    }
}
