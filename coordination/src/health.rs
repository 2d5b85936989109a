//! # Health Registry
//!
//! Per-service health snapshots built entirely on the cache primitive. Every
//! service publishes a record under `health:<name>` with a TTL; a record that
//! ages out means the service is considered down. A monitor enumerates the
//! prefix to find whatever is currently alive.

use std::sync::Arc;
use std::time::Duration;

use log::error;
use serde_json::{Map, Value};

use crate::cache::Cache;
use crate::store::{unix_now, StoreBackend, HEALTH_PREFIX};

/// Default lifetime of a health record; a service that stops publishing is
/// considered down once this elapses.
pub const DEFAULT_HEALTH_TTL: Duration = Duration::from_secs(60);

/// Publishes and reads service health records.
pub struct HealthRegistry {
    cache: Cache,
    store: Arc<dyn StoreBackend>,
}

impl HealthRegistry {
    pub(crate) fn new(store: Arc<dyn StoreBackend>, degraded: bool) -> Self {
        Self {
            cache: Cache::new(Arc::clone(&store), degraded),
            store,
        }
    }

    /// True when records only live inside this process.
    pub fn is_degraded(&self) -> bool {
        self.cache.is_degraded()
    }

    /// Writes the health record for `service`, stamping the current Unix time
    /// into a `timestamp` field. `ttl` defaults to [`DEFAULT_HEALTH_TTL`].
    pub fn publish(
        &self,
        service: &str,
        mut fields: Map<String, Value>,
        ttl: Option<Duration>,
    ) -> bool {
        fields.insert("timestamp".to_string(), Value::from(unix_now()));
        self.cache.set(
            &format!("{HEALTH_PREFIX}{service}"),
            &Value::Object(fields),
            ttl.unwrap_or(DEFAULT_HEALTH_TTL),
        )
    }

    /// Reads the health record for `service`, if it has not aged out.
    pub fn read(&self, service: &str) -> Option<Value> {
        self.cache.get(&format!("{HEALTH_PREFIX}{service}"))
    }

    /// Names of every service with a live health record. An unreachable store
    /// yields an empty list, never an error.
    pub fn list_active(&self) -> Vec<String> {
        match self.store.keys_with_prefix(HEALTH_PREFIX) {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|key| key.strip_prefix(HEALTH_PREFIX).map(str::to_string))
                .collect(),
            Err(e) => {
                error!("failed to enumerate active services: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn registry() -> HealthRegistry {
        HealthRegistry::new(Arc::new(MemoryStore::new()), true)
    }

    fn fields(status: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("status".to_string(), json!(status));
        map
    }

    #[test]
    fn publish_stamps_a_timestamp() {
        let registry = registry();
        assert!(registry.publish("collector", fields("running"), None));

        let record = registry.read("collector").expect("record missing");
        assert_eq!(record["status"], json!("running"));
        assert!(record["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn list_active_strips_the_prefix() {
        let registry = registry();
        registry.publish("collector", fields("running"), None);
        registry.publish("writer", fields("running"), None);

        let mut active = registry.list_active();
        active.sort();
        assert_eq!(active, vec!["collector", "writer"]);
    }

    #[test]
    fn records_age_out() {
        let registry = registry();
        registry.publish(
            "collector",
            fields("running"),
            Some(Duration::from_millis(30)),
        );
        assert!(registry.read("collector").is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(registry.read("collector").is_none());
        assert!(registry.list_active().is_empty());
    }
}
