// storage.rs: Keyed entry point over all workspace operations.
//
// Callers address files by (WorkspaceKey, relative path) only; the root
// directory is derived here and never exposed as an input. Every operation,
// reads included, runs under the workspace lock shared with the git
// coordinator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{MovePolicy, StorageConfig};
use crate::error::WorkspaceError;
use crate::files::FileStore;
use crate::key::WorkspaceKey;
use crate::lifecycle::WorkspaceLifecycle;
use crate::locks::WorkspaceLocks;
use crate::sandbox::PathSandbox;
use crate::stats::{FileCountStats, StatsCollector};
use crate::tree::{FileNode, FileTreeIndexer, ListOptions};

/// Storage engine for all workspaces under one base directory.
pub struct WorkspaceStorage {
    lifecycle: WorkspaceLifecycle,
    stats: StatsCollector,
    locks: Arc<WorkspaceLocks>,
    move_policy: MovePolicy,
    show_hidden: bool,
    lock_timeout: Duration,
}

impl WorkspaceStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_locks(config, Arc::new(WorkspaceLocks::new()))
    }

    /// Build a storage engine over an existing lock registry.
    pub fn with_locks(config: &StorageConfig, locks: Arc<WorkspaceLocks>) -> Self {
        Self {
            lifecycle: WorkspaceLifecycle::new(&config.base_dir),
            stats: StatsCollector::new(&config.base_dir),
            locks,
            move_policy: config.move_policy,
            show_hidden: config.show_hidden,
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        self.lifecycle.base_dir()
    }

    /// Shared lock registry. The git coordinator serializes through it.
    pub fn locks(&self) -> Arc<WorkspaceLocks> {
        Arc::clone(&self.locks)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Default listing options from configuration.
    pub fn default_list_options(&self) -> ListOptions {
        ListOptions {
            show_hidden: self.show_hidden,
        }
    }

    pub fn workspace_root(&self, key: WorkspaceKey) -> PathBuf {
        self.lifecycle.workspace_root(key)
    }

    pub fn sandbox(&self, key: WorkspaceKey) -> PathSandbox {
        PathSandbox::new(self.workspace_root(key))
    }

    fn files(&self, key: WorkspaceKey) -> FileStore {
        FileStore::new(self.sandbox(key), self.move_policy)
    }

    fn indexer(&self, key: WorkspaceKey) -> FileTreeIndexer {
        FileTreeIndexer::new(self.sandbox(key))
    }

    fn locked<T>(
        &self,
        key: WorkspaceKey,
        f: impl FnOnce() -> Result<T, WorkspaceError>,
    ) -> Result<T, WorkspaceError> {
        self.locks.with_lock(key, self.lock_timeout, f)
    }

    /// Resolve a relative path to its absolute location (PathSandbox).
    pub fn resolve(&self, key: WorkspaceKey, path: &str) -> Result<PathBuf, WorkspaceError> {
        self.sandbox(key).resolve(path)
    }

    pub fn initialize_user_workspace(&self, key: WorkspaceKey) -> Result<PathBuf, WorkspaceError> {
        self.locked(key, || self.lifecycle.initialize_user_workspace(key))
    }

    pub fn delete_user_workspace(&self, key: WorkspaceKey) -> Result<(), WorkspaceError> {
        self.locked(key, || self.lifecycle.delete_user_workspace(key))?;
        self.locks.forget(key);
        Ok(())
    }

    /// Remove every workspace of a user. Each workspace is removed under its
    /// own lock before the (then empty) user directory goes.
    pub fn delete_user(&self, user_id: u64) -> Result<(), WorkspaceError> {
        let keys: Vec<_> = self
            .stats
            .workspace_keys()?
            .into_iter()
            .filter(|k| k.user_id == user_id)
            .collect();
        for key in keys {
            self.delete_user_workspace(key)?;
        }
        self.lifecycle.delete_user(user_id)
    }

    pub fn get_content(&self, key: WorkspaceKey, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        self.locked(key, || self.files(key).get_content(path))
    }

    pub fn save(&self, key: WorkspaceKey, path: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        self.locked(key, || self.files(key).save(path, content))
    }

    pub fn delete(&self, key: WorkspaceKey, path: &str) -> Result<(), WorkspaceError> {
        self.locked(key, || self.files(key).delete(path))
    }

    pub fn move_file(&self, key: WorkspaceKey, src: &str, dest: &str) -> Result<(), WorkspaceError> {
        self.locked(key, || self.files(key).move_file(src, dest))
    }

    pub fn list(&self, key: WorkspaceKey, options: ListOptions) -> Result<Vec<FileNode>, WorkspaceError> {
        self.locked(key, || self.indexer(key).list(options))
    }

    pub fn find_by_name(&self, key: WorkspaceKey, filename: &str) -> Result<Vec<String>, WorkspaceError> {
        self.locked(key, || self.indexer(key).find_by_name(filename))
    }

    pub fn get_file_stats(&self, key: WorkspaceKey) -> Result<FileCountStats, WorkspaceError> {
        self.locked(key, || self.stats.get_file_stats(key))
    }

    /// System-wide stats. Each workspace is counted under its own lock.
    pub fn get_total_file_stats(&self) -> Result<FileCountStats, WorkspaceError> {
        let mut total = FileCountStats::default();
        for key in self.stats.workspace_keys()? {
            total += self.get_file_stats(key)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    fn storage() -> (TempDir, WorkspaceStorage) {
        let dir = tempdir().unwrap();
        let storage = WorkspaceStorage::new(&StorageConfig::new(dir.path()));
        (dir, storage)
    }

    #[test]
    fn operations_are_keyed_by_workspace() {
        let (_dir, storage) = storage();
        let a = WorkspaceKey::new(1, 1);
        let b = WorkspaceKey::new(1, 2);
        storage.initialize_user_workspace(a).unwrap();
        storage.initialize_user_workspace(b).unwrap();

        storage.save(a, "notes.md", b"in a").unwrap();
        assert!(storage.get_content(b, "notes.md").unwrap_err().is_not_found());
        assert_eq!(storage.get_content(a, "notes.md").unwrap(), b"in a");
    }

    #[test]
    fn operations_before_initialize_are_not_found() {
        let (_dir, storage) = storage();
        let key = WorkspaceKey::new(5, 5);
        assert!(storage.save(key, "a.md", b"x").unwrap_err().is_not_found());
        assert!(storage
            .list(key, ListOptions::default())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn full_file_lifecycle() {
        let (_dir, storage) = storage();
        let key = WorkspaceKey::new(1, 1);
        storage.initialize_user_workspace(key).unwrap();

        storage.save(key, "docs/readme.md", b"# hi").unwrap();
        storage.save(key, "test.md", b"test").unwrap();
        storage.move_file(key, "test.md", "notes/test.md").unwrap();
        assert_eq!(
            storage.find_by_name(key, "test.md").unwrap(),
            vec!["notes/test.md"]
        );

        let stats = storage.get_file_stats(key).unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_size, 8);

        storage.delete(key, "notes/test.md").unwrap();
        let nodes = storage.list(key, storage.default_list_options()).unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "notes"]);
    }

    #[test]
    fn delete_user_workspace_forgets_lock() {
        let (_dir, storage) = storage();
        let key = WorkspaceKey::new(1, 1);
        let root = storage.initialize_user_workspace(key).unwrap();
        storage.save(key, "a.md", b"a").unwrap();

        storage.delete_user_workspace(key).unwrap();
        assert!(!root.exists());
        assert!(storage.locks().is_empty());
    }

    #[test]
    fn delete_user_removes_all_workspaces() {
        let (dir, storage) = storage();
        storage.initialize_user_workspace(WorkspaceKey::new(4, 1)).unwrap();
        storage.initialize_user_workspace(WorkspaceKey::new(4, 2)).unwrap();
        storage.initialize_user_workspace(WorkspaceKey::new(5, 1)).unwrap();

        storage.delete_user(4).unwrap();
        assert!(!dir.path().join("4").exists());
        assert!(dir.path().join("5").join("1").exists());
    }

    #[test]
    fn total_stats_across_users() {
        let (_dir, storage) = storage();
        for (user, ws, content) in [(1, 1, "aa"), (1, 2, "bbb"), (2, 1, "c")] {
            let key = WorkspaceKey::new(user, ws);
            storage.initialize_user_workspace(key).unwrap();
            storage.save(key, "file.md", content.as_bytes()).unwrap();
        }
        let total = storage.get_total_file_stats().unwrap();
        assert_eq!(total.total_files, 3);
        assert_eq!(total.total_size, 6);
    }

    #[test]
    fn concurrent_saves_never_expose_partial_content() {
        let (_dir, storage) = storage();
        let storage = Arc::new(storage);
        let key = WorkspaceKey::new(1, 1);
        storage.initialize_user_workspace(key).unwrap();

        let big_a = vec![b'a'; 256 * 1024];
        let big_b = vec![b'b'; 256 * 1024];
        storage.save(key, "big.bin", &big_a).unwrap();

        let writer = {
            let storage = Arc::clone(&storage);
            let (a, b) = (big_a.clone(), big_b.clone());
            thread::spawn(move || {
                for i in 0..20 {
                    let content = if i % 2 == 0 { &b } else { &a };
                    storage.save(key, "big.bin", content).unwrap();
                }
            })
        };

        for _ in 0..20 {
            let content = storage.get_content(key, "big.bin").unwrap();
            assert!(content == big_a || content == big_b);
        }
        writer.join().unwrap();
    }
}
