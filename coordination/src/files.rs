//! # File Coordinator
//!
//! Scoped critical sections around file reads and writes, plus cursor
//! conveniences. Lock names derive from a fingerprint of the path combined
//! with an operation tag, so arbitrarily long paths stay valid store keys.
//!
//! The lock namespace per operation kind is an explicit policy, not an
//! accident: the historical behavior keeps `file_write:` and `file_read:`
//! separate, which gives writer/writer and reader/reader exclusion but lets a
//! reader and a writer of the same path run concurrently (optimistic reads).
//! Callers that need full readers-exclude-writers semantics select
//! [`LockNamespacePolicy::Unified`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cursors::CursorStore;
use crate::locks::{LockGuard, LockManager, LockOptions};
use crate::store::fingerprint;

/// How file locks are namespaced per operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockNamespacePolicy {
    /// Separate `file_write:` / `file_read:` namespaces. Readers and writers
    /// of the same path do not exclude each other.
    #[default]
    Split,
    /// One `file:` namespace for both operations; full mutual exclusion.
    Unified,
}

/// Default acquisition budget for write scopes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default acquisition budget for read scopes.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Composes the lock manager and cursor store into path-keyed operations.
pub struct FileCoordinator {
    locks: LockManager,
    cursors: Arc<CursorStore>,
    policy: LockNamespacePolicy,
}

impl FileCoordinator {
    pub(crate) fn new(
        locks: LockManager,
        cursors: Arc<CursorStore>,
        policy: LockNamespacePolicy,
    ) -> Self {
        Self {
            locks,
            cursors,
            policy,
        }
    }

    /// True when coordination only holds within this process.
    pub fn is_degraded(&self) -> bool {
        self.locks.is_degraded()
    }

    /// The namespace policy this coordinator was built with.
    pub fn policy(&self) -> LockNamespacePolicy {
        self.policy
    }

    fn lock_name(&self, path: &str, write: bool) -> String {
        let fp = fingerprint(path);
        match (self.policy, write) {
            (LockNamespacePolicy::Split, true) => format!("file_write:{fp}"),
            (LockNamespacePolicy::Split, false) => format!("file_read:{fp}"),
            (LockNamespacePolicy::Unified, _) => format!("file:{fp}"),
        }
    }

    fn scope_options(timeout: Duration) -> LockOptions {
        // The lease lives at most as long as the acquisition budget, matching
        // how callers size their critical sections.
        LockOptions {
            ttl: timeout,
            timeout,
            ..LockOptions::default()
        }
    }

    /// Runs `f` under the write lease for `path`.
    pub fn with_write_lock<T>(
        &self,
        path: &str,
        timeout: Duration,
        f: impl FnOnce(&LockGuard) -> T,
    ) -> T {
        self.locks.with_lock(
            &self.lock_name(path, true),
            &Self::scope_options(timeout),
            f,
        )
    }

    /// Runs `f` under the read lease for `path`.
    pub fn with_read_lock<T>(
        &self,
        path: &str,
        timeout: Duration,
        f: impl FnOnce(&LockGuard) -> T,
    ) -> T {
        self.locks.with_lock(
            &self.lock_name(path, false),
            &Self::scope_options(timeout),
            f,
        )
    }

    /// Reads the whole file under the read lease.
    pub fn read_to_string(&self, path: &str) -> io::Result<String> {
        self.with_read_lock(path, DEFAULT_READ_TIMEOUT, |_| fs::read_to_string(path))
    }

    /// Writes `content` under the write lease, creating parent directories as
    /// needed.
    pub fn write_string(&self, path: &str, content: &str) -> io::Result<()> {
        self.with_write_lock(path, DEFAULT_WRITE_TIMEOUT, |_| {
            if let Some(parent) = Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)
        })
    }

    /// Appends `content` under the write lease, creating the file and parent
    /// directories as needed.
    pub fn append_string(&self, path: &str, content: &str) -> io::Result<()> {
        self.with_write_lock(path, DEFAULT_WRITE_TIMEOUT, |_| {
            if let Some(parent) = Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(content.as_bytes())
        })
    }

    /// Current cursor offset for `path`; zero when no cursor exists yet.
    pub fn cursor_position(&self, path: &str) -> u64 {
        self.cursors.get(path).map_or(0, |cursor| cursor.position)
    }

    /// Advances the cursor for `path` after an incremental read.
    pub fn update_cursor(&self, path: &str, position: u64, checksum: &str) -> bool {
        self.cursors.set(path, position, checksum)
    }
}
