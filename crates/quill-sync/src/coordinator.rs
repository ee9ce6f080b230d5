//! Per-workspace git lifecycle: setup, disable, commit+push, pull
//!
//! Every operation takes the same workspace lock as file mutations in
//! [`WorkspaceStorage`], so a save never lands in the middle of a commit or a
//! pull. A workspace counts as git-enabled exactly when its root holds a
//! `.git` directory.
//!
//! Each operation has a `*_with_context` form taking the caller's
//! [`SyncContext`]; the plain form uses the configured network timeout.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use quill_workspace::sandbox::GIT_DIR;
use quill_workspace::{WorkspaceError, WorkspaceKey, WorkspaceLocks, WorkspaceStorage};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::client::{GitClientFactory, GitSyncClient, SyncContext};
use crate::config::{GitConfig, SyncSettings};
use crate::error::SyncError;
use crate::git::GitCliClient;

/// Result of a commit-and-push request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// A commit was created and pushed.
    Committed { commit_id: String },
    /// The working tree had no changes; nothing was pushed.
    NothingToCommit,
}

pub struct GitCoordinator {
    storage: Arc<WorkspaceStorage>,
    locks: Arc<WorkspaceLocks>,
    factory: Box<dyn GitClientFactory>,
    settings: SyncSettings,
}

impl GitCoordinator {
    pub fn new(
        storage: Arc<WorkspaceStorage>,
        factory: impl GitClientFactory + 'static,
        settings: SyncSettings,
    ) -> Self {
        let locks = storage.locks();
        Self {
            storage,
            locks,
            factory: Box::new(factory),
            settings,
        }
    }

    /// Coordinator backed by the system `git` binary.
    pub fn with_git_cli(storage: Arc<WorkspaceStorage>, settings: SyncSettings) -> Self {
        let factory = GitCliClient::factory(settings.clone());
        Self::new(storage, factory, settings)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_enabled(&self, key: WorkspaceKey) -> bool {
        self.storage.workspace_root(key).join(GIT_DIR).is_dir()
    }

    fn context(&self) -> SyncContext {
        SyncContext::with_timeout(self.settings.network_timeout())
    }

    fn locked<T>(
        &self,
        key: WorkspaceKey,
        f: impl FnOnce() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        self.locks.with_lock(key, self.storage.lock_timeout(), f)
    }

    /// Client for an initialized, git-enabled workspace.
    fn enabled_client(
        &self,
        key: WorkspaceKey,
        config: &GitConfig,
    ) -> Result<Box<dyn GitSyncClient>, SyncError> {
        let root = self.storage.workspace_root(key);
        if !root.join(GIT_DIR).is_dir() {
            return Err(SyncError::NotEnabled {
                workspace: key.to_string(),
            });
        }
        Ok(self.factory.create(&root, config))
    }

    /// Clone or attach the workspace to `config.remote_url`.
    ///
    /// Existing files are never touched when this fails: a `.git` directory
    /// created by the failed attempt is removed again.
    pub fn setup_git_repo(&self, key: WorkspaceKey, config: &GitConfig) -> Result<(), SyncError> {
        self.setup_git_repo_with_context(key, config, &self.context())
    }

    pub fn setup_git_repo_with_context(
        &self,
        key: WorkspaceKey,
        config: &GitConfig,
        ctx: &SyncContext,
    ) -> Result<(), SyncError> {
        config.validate(&self.settings)?;
        let root = self.storage.workspace_root(key);

        self.locked(key, || {
            if !root.is_dir() {
                return Err(WorkspaceError::NotFound {
                    path: key.to_string(),
                }
                .into());
            }
            let git_dir = root.join(GIT_DIR);
            let existed = git_dir.exists();

            let client = self.factory.create(&root, config);
            info!(workspace = %key, client = client.name(), "setting up git sync");

            match client.ensure_repo(ctx) {
                Ok(()) => {
                    info!(workspace = %key, "git sync enabled");
                    Ok(())
                }
                Err(err) => {
                    warn!(workspace = %key, error = %err, "git setup failed");
                    if !existed {
                        rollback_git_dir(&git_dir);
                    }
                    Err(err.into())
                }
            }
        })
    }

    /// Stop syncing: remove `.git` and nothing else.
    pub fn disable_git_repo(&self, key: WorkspaceKey) -> Result<(), SyncError> {
        let git_dir = self.storage.workspace_root(key).join(GIT_DIR);
        self.locked(key, || match fs::remove_dir_all(&git_dir) {
            Ok(()) => {
                info!(workspace = %key, "git sync disabled");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::IoError {
                path: git_dir.clone(),
                source: e,
            }
            .into()),
        })
    }

    /// Commit all changes with `message` and push them.
    pub fn stage_commit_and_push(
        &self,
        key: WorkspaceKey,
        config: &GitConfig,
        message: &str,
    ) -> Result<CommitOutcome, SyncError> {
        self.stage_commit_and_push_with_context(key, config, message, &self.context())
    }

    pub fn stage_commit_and_push_with_context(
        &self,
        key: WorkspaceKey,
        config: &GitConfig,
        message: &str,
        ctx: &SyncContext,
    ) -> Result<CommitOutcome, SyncError> {
        if message.trim().is_empty() {
            return Err(SyncError::EmptyCommitMessage);
        }
        config.validate(&self.settings)?;

        self.locked(key, || {
            let client = self.enabled_client(key, config)?;

            let Some(commit_id) = client.commit(ctx, message)? else {
                info!(workspace = %key, "nothing to commit");
                return Ok(CommitOutcome::NothingToCommit);
            };
            client.push(ctx)?;
            info!(workspace = %key, commit = %commit_id, "changes committed and pushed");
            Ok(CommitOutcome::Committed { commit_id })
        })
    }

    /// Fast-forward the workspace from its remote.
    pub fn pull(&self, key: WorkspaceKey, config: &GitConfig) -> Result<(), SyncError> {
        self.pull_with_context(key, config, &self.context())
    }

    pub fn pull_with_context(
        &self,
        key: WorkspaceKey,
        config: &GitConfig,
        ctx: &SyncContext,
    ) -> Result<(), SyncError> {
        config.validate(&self.settings)?;
        self.locked(key, || {
            let client = self.enabled_client(key, config)?;
            client.pull(ctx)?;
            info!(workspace = %key, "pulled from remote");
            Ok(())
        })
    }

    /// Commit and push after a file mutation, when the workspace has
    /// auto-commit on. Returns `None` when nothing was attempted.
    pub fn auto_commit(
        &self,
        key: WorkspaceKey,
        config: &GitConfig,
        action: &str,
        filename: &str,
    ) -> Result<Option<CommitOutcome>, SyncError> {
        if !config.enabled || !config.auto_commit || !self.is_enabled(key) {
            return Ok(None);
        }
        let message = config.render_commit_message(action, filename);
        self.stage_commit_and_push(key, config, &message).map(Some)
    }
}

fn rollback_git_dir(git_dir: &Path) {
    if !git_dir.exists() {
        return;
    }
    match fs::remove_dir_all(git_dir) {
        Ok(()) => info!(path = %git_dir.display(), "removed partially created repository"),
        Err(e) => error!(path = %git_dir.display(), error = %e, "failed to remove partial repository"),
    }
}
