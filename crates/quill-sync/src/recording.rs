//! Recording client: stand-in that performs no git or network operations
//!
//! Every call is counted, the last commit message is kept, and a failure can
//! be injected for any operation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use quill_workspace::sandbox::GIT_DIR;

use crate::client::{GitClientFactory, GitSyncClient, SyncContext};
use crate::config::GitConfig;
use crate::error::{GitError, GitErrorKind, GitOperation};

/// Number of calls per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub clone: usize,
    pub pull: usize,
    pub commit: usize,
    pub push: usize,
    pub ensure_repo: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.clone + self.pull + self.commit + self.push + self.ensure_repo
    }
}

type CommitHook = Arc<dyn Fn(&Path) + Send + Sync>;

#[derive(Default)]
struct RecordingState {
    calls: CallCounts,
    last_message: Option<String>,
    last_config: Option<GitConfig>,
    fail_on: Option<(GitOperation, GitErrorKind)>,
    commits: usize,
}

/// Client that records calls and simulates a repository with a `.git` dir.
///
/// Clones share state, so a test keeps one handle while the coordinator
/// gets others through [`RecordingClient::factory`].
#[derive(Clone, Default)]
pub struct RecordingClient {
    state: Arc<Mutex<RecordingState>>,
    commit_hook: Arc<Mutex<Option<CommitHook>>>,
    root: Option<PathBuf>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail with `kind` until cleared.
    pub fn fail_on(&self, operation: GitOperation, kind: GitErrorKind) {
        self.state.lock().fail_on = Some((operation, kind));
    }

    pub fn clear_failure(&self) {
        self.state.lock().fail_on = None;
    }

    /// Run `hook` with the workspace root at the start of every commit.
    pub fn on_commit(&self, hook: impl Fn(&Path) + Send + Sync + 'static) {
        *self.commit_hook.lock() = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    pub fn last_commit_message(&self) -> Option<String> {
        self.state.lock().last_message.clone()
    }

    /// Configuration the most recent client was created with.
    pub fn last_config(&self) -> Option<GitConfig> {
        self.state.lock().last_config.clone()
    }

    /// Factory handing out clients bound to the requested root.
    pub fn factory(&self) -> impl GitClientFactory {
        let template = self.clone();
        move |root: &Path, config: &GitConfig| -> Box<dyn GitSyncClient> {
            template.state.lock().last_config = Some(config.clone());
            let mut client = template.clone();
            client.root = Some(root.to_path_buf());
            Box::new(client)
        }
    }

    /// Count the call, then fail like a real client would: an interrupted
    /// context first, then any injected failure.
    fn record(&self, ctx: &SyncContext, operation: GitOperation) -> Result<(), GitError> {
        let mut state = self.state.lock();
        let calls = &mut state.calls;
        match operation {
            GitOperation::Clone => calls.clone += 1,
            GitOperation::Pull => calls.pull += 1,
            GitOperation::Commit => calls.commit += 1,
            GitOperation::Push => calls.push += 1,
            GitOperation::EnsureRepo => calls.ensure_repo += 1,
        }
        ctx.check(operation)?;
        match state.fail_on {
            Some((op, kind)) if op == operation => Err(GitError::new(
                operation,
                kind,
                format!("injected {kind} failure"),
            )),
            _ => Ok(()),
        }
    }

    /// Create the `.git` directory a real clone would leave behind.
    fn materialize_repo(&self, operation: GitOperation) -> Result<(), GitError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        fs::create_dir_all(root.join(GIT_DIR)).map_err(|e| {
            GitError::new(operation, GitErrorKind::Unknown, format!("{}: {e}", root.display()))
        })
    }
}

impl GitSyncClient for RecordingClient {
    fn clone_repo(&self, ctx: &SyncContext) -> Result<(), GitError> {
        tracing::debug!("RecordingClient: clone_repo()");
        self.materialize_repo(GitOperation::Clone)?;
        self.record(ctx, GitOperation::Clone)
    }

    fn pull(&self, ctx: &SyncContext) -> Result<(), GitError> {
        tracing::debug!("RecordingClient: pull()");
        self.record(ctx, GitOperation::Pull)
    }

    fn commit(&self, ctx: &SyncContext, message: &str) -> Result<Option<String>, GitError> {
        tracing::debug!("RecordingClient: commit()");
        let hook = self.commit_hook.lock().clone();
        if let (Some(hook), Some(root)) = (hook, &self.root) {
            hook(root);
        }
        self.record(ctx, GitOperation::Commit)?;

        let mut state = self.state.lock();
        state.last_message = Some(message.to_string());
        state.commits += 1;
        Ok(Some(format!("recorded-{}", state.commits)))
    }

    fn push(&self, ctx: &SyncContext) -> Result<(), GitError> {
        tracing::debug!("RecordingClient: push()");
        self.record(ctx, GitOperation::Push)
    }

    fn ensure_repo(&self, ctx: &SyncContext) -> Result<(), GitError> {
        tracing::debug!("RecordingClient: ensure_repo()");
        // A failed clone can still leave `.git` behind; callers must clean up.
        self.materialize_repo(GitOperation::EnsureRepo)?;
        self.record(ctx, GitOperation::EnsureRepo)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
