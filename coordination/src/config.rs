//! # Store Configuration
//!
//! Connection parameters for the coordination store, sourced from the
//! environment the same way the other service connections are
//! (`REDIS_HOST`, `REDIS_PORT`, `REDIS_DB`, `REDIS_PASSWORD`).

use std::env;

use serde::{Deserialize, Serialize};

/// Connection parameters for the coordination store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Hostname of the Redis server.
    pub host: String,
    /// Port of the Redis server.
    pub port: u16,
    /// Logical database index.
    pub db: i64,
    /// Optional credential; omitted from rendered URLs when absent.
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl StoreConfig {
    /// Builds the configuration from environment variables, falling back to
    /// the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            db: env::var("REDIS_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.db),
            password: env::var("REDIS_PASSWORD").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Renders the redis connection URL, e.g. `redis://localhost:6379/0`.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => {
                format!("redis://:{password}@{}:{}/{}", self.host, self.port, self.db)
            }
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}
