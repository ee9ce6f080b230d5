//! Core GitSyncClient trait and operation context

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::GitConfig;
use crate::error::{GitError, GitErrorKind, GitOperation};

/// Shared flag a caller flips to abandon a running git operation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation for one coordinator operation.
///
/// Every client call receives the context and must give up, killing any
/// child process, once it is cancelled or past its deadline.
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl SyncContext {
    /// No deadline, not cancellable from outside.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Why the operation must stop, if it must.
    pub fn interrupted(&self) -> Option<GitErrorKind> {
        if self.cancel.is_cancelled() {
            return Some(GitErrorKind::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(GitErrorKind::TimedOut),
            _ => None,
        }
    }

    /// Fail with TimedOut/Cancelled when the operation must stop.
    pub fn check(&self, operation: GitOperation) -> Result<(), GitError> {
        match self.interrupted() {
            Some(kind) => Err(GitError::new(
                operation,
                kind,
                format!("operation {kind} before completion"),
            )),
            None => Ok(()),
        }
    }
}

/// Pluggable git backend bound to one workspace root.
///
/// The coordinator holds the workspace lock around every call, so
/// implementations never see concurrent calls for the same root.
pub trait GitSyncClient: Send + Sync {
    /// Clone the remote into the workspace root. A populated root is attached
    /// to the remote instead, subject to the attach policy.
    fn clone_repo(&self, ctx: &SyncContext) -> Result<(), GitError>;

    /// Fast-forward the working tree from the remote.
    fn pull(&self, ctx: &SyncContext) -> Result<(), GitError>;

    /// Stage everything and commit. Returns the new commit id, or `None`
    /// when there was nothing to commit.
    fn commit(&self, ctx: &SyncContext, message: &str) -> Result<Option<String>, GitError>;

    /// Push the current branch to the remote.
    fn push(&self, ctx: &SyncContext) -> Result<(), GitError>;

    /// Clone when the root has no repository yet, otherwise refresh remote
    /// settings and pull.
    fn ensure_repo(&self, ctx: &SyncContext) -> Result<(), GitError>;

    /// Client display name (for logs and CLI output)
    fn name(&self) -> &str;
}

/// Builds a client for a workspace root and the caller's git configuration.
pub trait GitClientFactory: Send + Sync {
    fn create(&self, root: &Path, config: &GitConfig) -> Box<dyn GitSyncClient>;
}

impl<F> GitClientFactory for F
where
    F: Fn(&Path, &GitConfig) -> Box<dyn GitSyncClient> + Send + Sync,
{
    fn create(&self, root: &Path, config: &GitConfig) -> Box<dyn GitSyncClient> {
        self(root, config)
    }
}
