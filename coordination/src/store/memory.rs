//! # In-Process Store
//!
//! Local stand-in for the Redis backend, selected when the server is
//! unreachable at startup. Mutual exclusion and cursor state then hold within
//! one process only; callers see that through the owning component's
//! `is_degraded()` flag. TTLs are logical: an expired entry is treated as
//! absent on every read and dropped lazily.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{StoreBackend, StoreResult};

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |t| Instant::now() < t)
    }
}

#[derive(Default)]
struct Tables {
    strings: HashMap<String, Entry>,
    hashes: HashMap<String, (HashMap<String, String>, Option<Instant>)>,
}

impl Tables {
    fn hash_live(entry: &(HashMap<String, String>, Option<Instant>)) -> bool {
        entry.1.map_or(true, |t| Instant::now() < t)
    }
}

/// Mutex-guarded in-process key-value tables with the same capability surface
/// as the Redis backend. Also serves as the store double in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty in-process store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store lock poisoned")
    }
}

impl StoreBackend for MemoryStore {
    fn probe(&self) -> bool {
        true
    }

    fn try_set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut tables = self.lock();
        if tables.strings.get(key).is_some_and(Entry::live) {
            return Ok(false);
        }
        tables.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut tables = self.lock();
        match tables.strings.get(key) {
            Some(entry) if entry.live() && entry.value == expected => {
                tables.strings.remove(key);
                Ok(true)
            }
            Some(entry) if !entry.live() => {
                // Reap the dead entry; the comparison itself still fails.
                tables.strings.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let tables = self.lock();
        Ok(tables
            .strings
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut tables = self.lock();
        tables.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut tables = self.lock();
        let had_string = tables.strings.remove(key).is_some_and(|e| e.live());
        let had_hash = tables
            .hashes
            .remove(key)
            .is_some_and(|e| Tables::hash_live(&e));
        Ok(had_string || had_hash)
    }

    fn hash_set(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let mut tables = self.lock();
        let entry = tables
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| (HashMap::new(), None));
        if !Tables::hash_live(entry) {
            entry.0.clear();
        }
        for (field, value) in fields {
            entry.0.insert(field.clone(), value.clone());
        }
        if let Some(ttl) = ttl {
            entry.1 = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        let tables = self.lock();
        Ok(tables
            .hashes
            .get(key)
            .filter(|e| Tables::hash_live(e))
            .filter(|e| !e.0.is_empty())
            .map(|e| e.0.clone()))
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let tables = self.lock();
        let mut keys: Vec<String> = tables
            .strings
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.live())
            .map(|(k, _)| k.clone())
            .collect();
        keys.extend(
            tables
                .hashes
                .iter()
                .filter(|(k, e)| k.starts_with(prefix) && Tables::hash_live(e))
                .map(|(k, _)| k.clone()),
        );
        Ok(keys)
    }

    fn publish(&self, _channel: &str, _payload: &str) -> StoreResult<u64> {
        // No subscribers exist in-process.
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_if_absent_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store
            .try_set_if_absent("lock:a", "tok-1", Duration::from_secs(5))
            .unwrap());
        assert!(!store
            .try_set_if_absent("lock:a", "tok-2", Duration::from_secs(5))
            .unwrap());
        assert_eq!(store.get("lock:a").unwrap().as_deref(), Some("tok-1"));
    }

    #[test]
    fn set_if_absent_succeeds_after_expiry() {
        let store = MemoryStore::new();
        assert!(store
            .try_set_if_absent("lock:a", "tok-1", Duration::from_millis(20))
            .unwrap());
        std::thread::sleep(Duration::from_millis(40));
        assert!(store
            .try_set_if_absent("lock:a", "tok-2", Duration::from_secs(5))
            .unwrap());
    }

    #[test]
    fn compare_and_delete_requires_matching_token() {
        let store = MemoryStore::new();
        store
            .try_set_if_absent("lock:a", "tok-1", Duration::from_secs(5))
            .unwrap();
        assert!(!store.compare_and_delete("lock:a", "tok-2").unwrap());
        assert!(store.get("lock:a").unwrap().is_some());
        assert!(store.compare_and_delete("lock:a", "tok-1").unwrap());
        assert!(store.get("lock:a").unwrap().is_none());
    }

    #[test]
    fn string_ttl_is_honored_on_read() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn hash_round_trip_and_prefix_enumeration() {
        let store = MemoryStore::new();
        let fields = vec![
            ("position".to_string(), "1024".to_string()),
            ("checksum".to_string(), "abc".to_string()),
        ];
        store.hash_set("cursor:aa", &fields, None).unwrap();
        store.set("cursor:bb", "raw", None).unwrap();
        store.set("other:cc", "raw", None).unwrap();

        let map = store.hash_get_all("cursor:aa").unwrap().unwrap();
        assert_eq!(map.get("position").map(String::as_str), Some("1024"));

        let mut keys = store.keys_with_prefix("cursor:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cursor:aa", "cursor:bb"]);
    }

    #[test]
    fn delete_reports_whether_anything_existed() {
        let store = MemoryStore::new();
        store.set("k", "v", None).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }
}
