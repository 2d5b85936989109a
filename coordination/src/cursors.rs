//! # Cursor Store
//!
//! Persisted progress markers for incremental file consumption. Each resource
//! keeps at most one cursor record, stored as a hash under
//! `cursor:<fingerprint(path)>` with a 24 hour store-side TTL; the original
//! path travels inside the record for diagnostics and local fallback. Cursors
//! are owned by one producer pipeline at a time by convention, so reads and
//! writes are not locked here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::store::{fingerprint, unix_now, StoreBackend, CURSOR_PREFIX};

/// Store-side TTL on cursor records; the cleanup sweep uses `last_updated`,
/// this only bounds garbage from abandoned pipelines.
const CURSOR_TTL: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// # Cursor
///
/// Read progress for one resource (typically a growing CSV file).
pub struct Cursor {
    /// Original resource identifier, the path before fingerprinting.
    pub path: String,
    /// Non-negative byte or record offset already consumed.
    pub position: u64,
    /// Caller-defined fingerprint of consumed content. Advisory only; this
    /// layer never verifies it.
    pub checksum: String,
    /// Unix seconds of the last write.
    pub last_updated: f64,
}

impl Cursor {
    fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("path".to_string(), self.path.clone()),
            ("position".to_string(), self.position.to_string()),
            ("checksum".to_string(), self.checksum.clone()),
            ("last_updated".to_string(), self.last_updated.to_string()),
        ]
    }

    fn from_fields(map: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            path: map.get("path")?.clone(),
            position: map.get("position")?.parse().ok()?,
            checksum: map.get("checksum").cloned().unwrap_or_default(),
            last_updated: map.get("last_updated")?.parse().ok()?,
        })
    }
}

fn cursor_key(path: &str) -> String {
    format!("{CURSOR_PREFIX}{}", fingerprint(path))
}

/// Store-backed cursor records with a process-local fallback map. A write
/// that fails on the store side still lands in the local map so subsequent
/// reads in this process stay consistent; the return value reports the
/// preferred path so callers can detect the degradation.
pub struct CursorStore {
    store: Arc<dyn StoreBackend>,
    fallback: Mutex<HashMap<String, Cursor>>,
    degraded: bool,
}

impl CursorStore {
    pub(crate) fn new(store: Arc<dyn StoreBackend>, degraded: bool) -> Self {
        Self {
            store,
            fallback: Mutex::new(HashMap::new()),
            degraded,
        }
    }

    /// True when the layer was constructed without a reachable store.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn local(&self) -> std::sync::MutexGuard<'_, HashMap<String, Cursor>> {
        self.fallback.lock().expect("cursor fallback lock poisoned")
    }

    /// Writes the cursor for `path`, overwriting any previous record. Returns
    /// the outcome of the preferred (store) path; on failure the record is
    /// still kept locally and later `get`s will see it.
    pub fn set(&self, path: &str, position: u64, checksum: &str) -> bool {
        let cursor = Cursor {
            path: path.to_string(),
            position,
            checksum: checksum.to_string(),
            last_updated: unix_now(),
        };
        match self
            .store
            .hash_set(&cursor_key(path), &cursor.to_fields(), Some(CURSOR_TTL))
        {
            Ok(()) => true,
            Err(e) => {
                error!("failed to persist cursor for {path}: {e}; keeping local copy");
                self.local().insert(path.to_string(), cursor);
                false
            }
        }
    }

    /// Reads the cursor for `path`. Falls back to the local map on store
    /// errors or misses.
    pub fn get(&self, path: &str) -> Option<Cursor> {
        match self.store.hash_get_all(&cursor_key(path)) {
            Ok(Some(map)) => Cursor::from_fields(&map),
            Ok(None) => self.local().get(path).cloned(),
            Err(e) => {
                error!("failed to read cursor for {path}: {e}");
                self.local().get(path).cloned()
            }
        }
    }

    /// Removes the cursor for `path` from both sides. Returns true when a
    /// record existed anywhere.
    pub fn clear(&self, path: &str) -> bool {
        let had_local = self.local().remove(path).is_some();
        match self.store.delete(&cursor_key(path)) {
            Ok(removed) => removed || had_local,
            Err(e) => {
                error!("failed to clear cursor for {path}: {e}");
                had_local
            }
        }
    }

    /// Number of records living only in the process-local fallback map.
    pub fn local_len(&self) -> usize {
        self.local().len()
    }

    /// Removes every cursor whose `last_updated` predates `now - max_age_hours`,
    /// on the store (prefix scan) and in the local map. Returns the count
    /// removed. Records with a missing or unparsable timestamp count as stale.
    pub fn cleanup_expired(&self, max_age_hours: u64) -> usize {
        let cutoff = unix_now() - (max_age_hours as f64) * 3_600.0;
        let mut cleaned = 0;

        match self.store.keys_with_prefix(CURSOR_PREFIX) {
            Ok(keys) => {
                for key in keys {
                    let stale = match self.store.hash_get_all(&key) {
                        Ok(Some(map)) => map
                            .get("last_updated")
                            .and_then(|v| v.parse::<f64>().ok())
                            .map_or(true, |ts| ts < cutoff),
                        Ok(None) => false,
                        Err(e) => {
                            error!("cursor cleanup read failed for {key}: {e}");
                            false
                        }
                    };
                    if stale && self.store.delete(&key).unwrap_or(false) {
                        cleaned += 1;
                    }
                }
            }
            Err(e) => error!("cursor cleanup scan failed: {e}"),
        }

        let mut local = self.local();
        let before = local.len();
        local.retain(|_, cursor| cursor.last_updated >= cutoff);
        cleaned += before - local.len();

        info!("cleaned up {cleaned} expired cursors");
        cleaned
    }
}
