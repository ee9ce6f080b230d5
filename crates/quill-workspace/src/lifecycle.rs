// lifecycle.rs: Creation and removal of workspace root directories.
//
// A workspace root exists for as long as its metadata record does. It is
// created before any file operation is attempted and removed only when the
// workspace or its owner is deleted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::WorkspaceError;
use crate::key::WorkspaceKey;

/// Manages `base_dir/<user_id>/<workspace_id>` directories.
#[derive(Debug, Clone)]
pub struct WorkspaceLifecycle {
    base_dir: PathBuf,
}

impl WorkspaceLifecycle {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn workspace_root(&self, key: WorkspaceKey) -> PathBuf {
        key.root_in(&self.base_dir)
    }

    /// Create the workspace root and its ancestors. Safe to call repeatedly.
    pub fn initialize_user_workspace(&self, key: WorkspaceKey) -> Result<PathBuf, WorkspaceError> {
        let root = self.workspace_root(key);
        fs::create_dir_all(&root).map_err(|source| WorkspaceError::io(&root, source))?;
        info!(workspace = %key, "initialized workspace directory");
        Ok(root)
    }

    /// Irreversibly remove the workspace root. An absent root is not an error.
    pub fn delete_user_workspace(&self, key: WorkspaceKey) -> Result<(), WorkspaceError> {
        let root = self.workspace_root(key);
        remove_tree(&root)?;
        info!(workspace = %key, "deleted workspace directory");
        Ok(())
    }

    /// Remove every workspace of a user (account deletion).
    pub fn delete_user(&self, user_id: u64) -> Result<(), WorkspaceError> {
        let user_dir = self.base_dir.join(user_id.to_string());
        remove_tree(&user_dir)?;
        info!(user_id, "deleted all workspaces of user");
        Ok(())
    }
}

fn remove_tree(path: &Path) -> Result<(), WorkspaceError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(WorkspaceError::io(path, source)),
    }
}
