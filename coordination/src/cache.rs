//! # TTL Cache
//!
//! Generic key/value cache over the coordination store. Values are portable
//! text on the wire: strings go through untouched, anything else is JSON
//! encoded; a payload that fails to decode on the way back is handed over as
//! a raw string rather than an error. There is deliberately no local
//! fallback; a cache miss is always tolerable.

use std::sync::Arc;
use std::time::Duration;

use log::error;
use serde_json::Value;

use crate::store::StoreBackend;

/// TTL-scoped shared cache over the selected store backend.
pub struct Cache {
    store: Arc<dyn StoreBackend>,
    degraded: bool,
}

impl Cache {
    pub(crate) fn new(store: Arc<dyn StoreBackend>, degraded: bool) -> Self {
        Self { store, degraded }
    }

    /// True when the layer was constructed without a reachable store; every
    /// `set` will report false and every `get` a miss.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Stores `value` under `key` for `ttl`. Returns false when encoding or
    /// the store write fails.
    pub fn set(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        let payload = match value {
            Value::String(s) => s.clone(),
            other => match serde_json::to_string(other) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to encode cache value for {key}: {e}");
                    return false;
                }
            },
        };
        match self.store.set(key, &payload, Some(ttl)) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to cache value for {key}: {e}");
                false
            }
        }
    }

    /// Reads and decodes the value under `key`. Missing, expired or
    /// unreachable all come back as `None`; undecodable payloads come back as
    /// the raw string.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(_) => Some(Value::String(raw)),
            },
            Ok(None) => None,
            Err(e) => {
                error!("failed to read cached value for {key}: {e}");
                None
            }
        }
    }

    /// Removes `key`. Returns true when a value was present.
    pub fn delete(&self, key: &str) -> bool {
        match self.store.delete(key) {
            Ok(removed) => removed,
            Err(e) => {
                error!("failed to delete cached key {key}: {e}");
                false
            }
        }
    }

    /// Publishes a JSON message on a channel. Returns true when at least one
    /// subscriber received it.
    pub fn publish(&self, channel: &str, message: &Value) -> bool {
        let payload = match serde_json::to_string(message) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to encode message for channel {channel}: {e}");
                return false;
            }
        };
        match self.store.publish(channel, &payload) {
            Ok(receivers) => receivers > 0,
            Err(e) => {
                error!("failed to publish to channel {channel}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryStore::new()), true)
    }

    #[test]
    fn strings_round_trip_raw() {
        let cache = cache();
        assert!(cache.set("greeting", &json!("hello"), Duration::from_secs(5)));
        assert_eq!(cache.get("greeting"), Some(json!("hello")));
    }

    #[test]
    fn structured_values_round_trip_as_json() {
        let cache = cache();
        let value = json!({"index": "NIFTY", "last_price": 100.5, "depth": [1, 2, 3]});
        assert!(cache.set("tick", &value, Duration::from_secs(5)));
        assert_eq!(cache.get("tick"), Some(value));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = cache();
        assert!(cache.set("k", &json!("v"), Duration::from_millis(30)));
        assert_eq!(cache.get("k"), Some(json!("v")));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn undecodable_payload_comes_back_as_raw_string() {
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::new(store.clone(), true);
        // Not valid JSON; a foreign writer may have stored it.
        store
            .set("opaque", "not{json", Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(cache.get("opaque"), Some(json!("not{json")));
    }

    #[test]
    fn delete_reports_presence() {
        let cache = cache();
        cache.set("k", &json!(1), Duration::from_secs(5));
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert_eq!(cache.get("k"), None);
    }
}
