// locks.rs: Per-workspace mutual exclusion.
//
// One mutex per WorkspaceKey, created on first use. File mutations, reads
// and git operations on a workspace all run while holding its mutex, so a
// push or pull can never interleave with a save. Different workspaces share
// nothing but the registry map, which is only held long enough to clone an
// Arc.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::WorkspaceError;
use crate::key::WorkspaceKey;

/// Registry of per-workspace locks.
#[derive(Debug, Default)]
pub struct WorkspaceLocks {
    locks: Mutex<HashMap<WorkspaceKey, Arc<Mutex<()>>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: WorkspaceKey) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock();
        Arc::clone(map.entry(key).or_default())
    }

    /// Run `f` while holding the workspace's lock.
    ///
    /// Waits at most `timeout` for the lock; a workspace that stays busy
    /// longer fails with `LockTimeout` instead of blocking the caller forever.
    pub fn with_lock<T, E>(
        &self,
        key: WorkspaceKey,
        timeout: Duration,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<WorkspaceError>,
    {
        let lock = self.lock_for(key);
        let _guard = match lock.try_lock_for(timeout) {
            Some(guard) => guard,
            None => {
                warn!(workspace = %key, ?timeout, "workspace lock acquisition timed out");
                return Err(WorkspaceError::LockTimeout {
                    workspace: key.to_string(),
                }
                .into());
            }
        };
        f()
    }

    /// Drop the registry entry for a deleted workspace.
    ///
    /// The entry stays while any caller still holds or waits on the lock, so
    /// a later caller can never get a second mutex for the same key. The
    /// count is read under the registry mutex, which is also where new
    /// clones are handed out.
    pub fn forget(&self, key: WorkspaceKey) {
        let mut map = self.locks.lock();
        if map.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&key);
        }
    }

    /// Number of workspaces that currently have a lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
