//! # Coordination Layer
//!
//! Redis-backed coordination for the data pipeline services (collectors,
//! writers, analytics jobs) that share files and cached state on hosts where
//! native file locks are unreliable across processes. The layer provides:
//!
//! - named, time-bounded mutual-exclusion leases ([`locks`]),
//! - per-resource progress cursors for incremental file reads ([`cursors`]),
//! - a generic TTL key/value cache ([`cache`]),
//! - a service health registry built on the cache ([`health`]),
//! - scoped critical sections around file I/O ([`files`]).
//!
//! All components talk to the store through the [`store::StoreBackend`]
//! capability trait. The backend is probed and selected exactly once when the
//! [`coordinator::Coordinator`] is constructed: a reachable Redis yields the
//! remote backend, anything else yields the in-process backend with documented
//! reduced guarantees (exclusion within one process only). Every component
//! reports that degradation via `is_degraded()` so services can surface a
//! warning instead of failing outright.

// Declare the modules to re-export
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod cursors;
pub mod files;
pub mod health;
pub mod locks;
pub mod store;

// Re-export everything
pub use cache::*;
pub use config::*;
pub use coordinator::*;
pub use cursors::*;
pub use files::*;
pub use health::*;
pub use locks::*;
pub use store::*;
