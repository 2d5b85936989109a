//! # Redis-Backed Store
//!
//! Synchronous wrapper over `redis::Client`, in the same shape as the other
//! service connection handlers: each operation draws a fresh connection from
//! the client and performs a single command (or a single server-side script),
//! translating any failure straight into a [`StoreError`]. No retries happen
//! here; an unreachable server must fail fast so the caller can take its
//! fallback branch.

use std::collections::HashMap;
use std::time::Duration;

use redis::{Client, Commands, Connection, Script};

use super::{StoreBackend, StoreResult};

/// Lua guard executed server-side: delete the key only while it still holds
/// the caller's token. Running this as one script keeps release atomic with
/// respect to TTL expiry and re-acquisition by another owner.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// A handler for coordination-store interactions over Redis.
pub struct RedisStore {
    /// The internal Redis client instance.
    client: Client,
    /// Pre-parsed release script, shared by all compare-and-delete calls.
    release_script: Script,
}

impl RedisStore {
    /// Creates a new store handler from a connection string.
    ///
    /// # Arguments
    /// * `url` - The redis URL (e.g., "redis://127.0.0.1:6379/0").
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            release_script: Script::new(COMPARE_AND_DELETE),
        })
    }

    fn connection(&self) -> StoreResult<Connection> {
        Ok(self.client.get_connection()?)
    }
}

/// Redis expiries are whole seconds; round sub-second TTLs up to one second
/// rather than letting them mean "no expiry".
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl StoreBackend for RedisStore {
    fn probe(&self) -> bool {
        match self.connection() {
            Ok(mut conn) => redis::cmd("PING").query::<String>(&mut conn).is_ok(),
            Err(_) => false,
        }
    }

    fn try_set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query(&mut conn)?;
        Ok(reply.is_some())
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let removed: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke(&mut conn)?;
        Ok(removed == 1)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection()?;
        Ok(conn.get(key)?)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.connection()?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl_secs(ttl))?;
            }
            None => {
                let _: () = conn.set(key, value)?;
            }
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection()?;
        let removed: i64 = conn.del(key)?;
        Ok(removed > 0)
    }

    fn hash_set(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let mut conn = self.connection()?;
        let _: () = conn.hset_multiple(key, fields)?;
        if let Some(ttl) = ttl {
            let _: () = conn.expire(key, ttl_secs(ttl) as i64)?;
        }
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        let mut conn = self.connection()?;
        let map: HashMap<String, String> = conn.hgetall(key)?;
        Ok(if map.is_empty() { None } else { Some(map) })
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection()?;
        Ok(conn.keys(format!("{prefix}*"))?)
    }

    fn publish(&self, channel: &str, payload: &str) -> StoreResult<u64> {
        let mut conn = self.connection()?;
        let receivers: u64 = conn.publish(channel, payload)?;
        Ok(receivers)
    }
}
