//! Git client backed by the system `git` binary

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quill_workspace::sandbox::GIT_DIR;
use tracing::{debug, info, warn};

use crate::client::{GitClientFactory, GitSyncClient, SyncContext};
use crate::config::{AttachPolicy, GitConfig, SyncSettings};
use crate::error::{GitError, GitErrorKind, GitOperation};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Git client that shells out to `git` for one workspace root.
///
/// Features:
/// - Clone into an empty root, or attach a populated root to the remote
/// - Fast-forward-only pull that refuses to touch a dirty working tree
/// - Commit of everything in the root, push of the current branch
/// - HTTP basic auth passed through the environment, never persisted
/// - Every child process is killed once the context deadline passes
pub struct GitCliClient {
    /// Working directory for git operations (the workspace root)
    work_dir: PathBuf,
    config: GitConfig,
    settings: SyncSettings,
}

struct GitOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Branches advertised by the remote.
#[derive(Debug, Default, PartialEq, Eq)]
struct RemoteRefs {
    head: Option<String>,
    branches: Vec<String>,
}

impl RemoteRefs {
    fn parse(output: &str) -> Self {
        let mut refs = RemoteRefs::default();
        for line in output.lines() {
            if let Some(symref) = line.strip_prefix("ref: ") {
                let mut parts = symref.split('\t');
                if let (Some(target), Some("HEAD")) = (parts.next(), parts.next()) {
                    refs.head = target.strip_prefix("refs/heads/").map(str::to_string);
                }
                continue;
            }
            if let Some(branch) = line
                .split('\t')
                .nth(1)
                .and_then(|name| name.strip_prefix("refs/heads/"))
            {
                refs.branches.push(branch.to_string());
            }
        }
        refs
    }

    /// Branch to check out: the remote HEAD when it exists, then the
    /// configured default, then whatever branch comes first.
    fn pick_branch(&self, default_branch: &str) -> Option<String> {
        if let Some(head) = &self.head {
            if self.branches.contains(head) {
                return Some(head.clone());
            }
        }
        if self.branches.iter().any(|b| b == default_branch) {
            return Some(default_branch.to_string());
        }
        self.branches.first().cloned()
    }
}

impl GitCliClient {
    pub fn new(work_dir: impl Into<PathBuf>, config: GitConfig, settings: SyncSettings) -> Self {
        Self {
            work_dir: work_dir.into(),
            config,
            settings,
        }
    }

    /// Factory producing CLI clients that share `settings`.
    pub fn factory(settings: SyncSettings) -> impl GitClientFactory {
        move |root: &Path, config: &GitConfig| -> Box<dyn GitSyncClient> {
            Box::new(GitCliClient::new(root, config.clone(), settings.clone()))
        }
    }

    fn is_repo(&self) -> bool {
        self.work_dir.join(GIT_DIR).exists()
    }

    fn remote_url(&self) -> &str {
        self.config.remote_url.trim()
    }

    /// Per-command git config: the transport restriction, plus the basic
    /// auth header for http(s) remotes with credentials.
    fn command_config(&self, with_auth: bool) -> Vec<(&'static str, String)> {
        let mut config = Vec::new();
        if !self.settings.allow_local_remotes {
            config.push(("protocol.file.allow", "never".to_string()));
        }
        let url = self.remote_url();
        let is_http = url.starts_with("https://") || url.starts_with("http://");
        if with_auth && is_http && self.config.has_credentials() {
            let user = if self.config.username.is_empty() {
                "git"
            } else {
                self.config.username.as_str()
            };
            let encoded = STANDARD.encode(format!("{user}:{}", self.config.token));
            config.push(("http.extraHeader", format!("Authorization: Basic {encoded}")));
        }
        config
    }

    /// `command_config` as `GIT_CONFIG_*` environment variables.
    fn config_env(&self, with_auth: bool) -> Vec<(String, String)> {
        let config = self.command_config(with_auth);
        let mut env = vec![("GIT_CONFIG_COUNT".to_string(), config.len().to_string())];
        for (i, (key, value)) in config.into_iter().enumerate() {
            env.push((format!("GIT_CONFIG_KEY_{i}"), key.to_string()));
            env.push((format!("GIT_CONFIG_VALUE_{i}"), value));
        }
        if !self.settings.allow_local_remotes {
            env.push(("GIT_PROTOCOL_FROM_USER".to_string(), "0".to_string()));
        }
        env
    }

    fn identity_env(&self) -> Vec<(String, String)> {
        let name = &self.config.commit_name;
        let email = &self.config.commit_email;
        let mut env = self.config_env(false);
        env.extend([
            ("GIT_AUTHOR_NAME".to_string(), name.clone()),
            ("GIT_AUTHOR_EMAIL".to_string(), email.clone()),
            ("GIT_COMMITTER_NAME".to_string(), name.clone()),
            ("GIT_COMMITTER_EMAIL".to_string(), email.clone()),
        ]);
        env
    }

    /// Spawn git and wait for it under the context's deadline.
    fn exec(
        &self,
        ctx: &SyncContext,
        op: GitOperation,
        args: &[&str],
        envs: &[(String, String)],
    ) -> Result<GitOutput, GitError> {
        ctx.check(op)?;
        debug!(operation = %op, command = args.first().copied().unwrap_or(""), "running git");

        let mut command = Command::new(&self.settings.git_binary);
        command
            .args(args)
            .current_dir(&self.work_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in envs {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            GitError::new(
                op,
                GitErrorKind::Unknown,
                format!("failed to run {}: {e}", self.settings.git_binary.display()),
            )
        })?;
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());
        let status = wait_with_context(&mut child, ctx, op)?;

        Ok(GitOutput {
            status,
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
        })
    }

    /// Run a git command, turning a non-zero exit into a classified error.
    fn run(
        &self,
        ctx: &SyncContext,
        op: GitOperation,
        args: &[&str],
        envs: &[(String, String)],
    ) -> Result<String, GitError> {
        let output = self.exec(ctx, op, args, envs)?;
        if !output.status.success() {
            let mut err = GitError::classify(op, &output.stderr);
            err.message = format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or(""),
                err.message
            );
            return Err(err);
        }
        Ok(output.stdout)
    }

    /// Local-only git command
    fn git(&self, ctx: &SyncContext, op: GitOperation, args: &[&str]) -> Result<String, GitError> {
        self.run(ctx, op, args, &self.config_env(false))
    }

    /// Git command that talks to the remote
    fn git_remote(
        &self,
        ctx: &SyncContext,
        op: GitOperation,
        args: &[&str],
    ) -> Result<String, GitError> {
        self.run(ctx, op, args, &self.config_env(true))
    }

    /// URL of `origin`, or `None` when the repository has no such remote.
    fn origin_url(&self, ctx: &SyncContext, op: GitOperation) -> Result<Option<String>, GitError> {
        let remotes = self.git(ctx, op, &["remote"])?;
        if !remotes.lines().any(|r| r.trim() == "origin") {
            return Ok(None);
        }
        self.git(ctx, op, &["remote", "get-url", "origin"]).map(Some)
    }

    fn set_origin(
        &self,
        ctx: &SyncContext,
        op: GitOperation,
        current: Option<&str>,
        url: &str,
    ) -> Result<(), GitError> {
        match current {
            Some(existing) if existing == url => {}
            Some(_) => {
                self.git(ctx, op, &["remote", "set-url", "origin", url])?;
            }
            None => {
                self.git(ctx, op, &["remote", "add", "origin", url])?;
            }
        }
        Ok(())
    }

    fn configure_remote(&self, ctx: &SyncContext, op: GitOperation) -> Result<(), GitError> {
        let current = self.origin_url(ctx, op)?;
        self.set_origin(ctx, op, current.as_deref(), self.remote_url())
    }

    /// Put `origin` back the way it was before a failed refresh.
    fn restore_origin(&self, previous: Option<&str>) {
        // The original context may have expired; restoring is local only.
        let ctx = SyncContext::with_timeout(self.settings.network_timeout());
        let op = GitOperation::EnsureRepo;
        let result = match previous {
            Some(url) => self.git(&ctx, op, &["remote", "set-url", "origin", url]),
            None => self.git(&ctx, op, &["remote", "remove", "origin"]),
        };
        if let Err(err) = result {
            warn!(root = %self.work_dir.display(), error = %err, "failed to restore origin URL");
        }
    }

    fn remote_refs(&self, ctx: &SyncContext, op: GitOperation) -> Result<RemoteRefs, GitError> {
        let output = self.git_remote(ctx, op, &["ls-remote", "--symref", "origin"])?;
        Ok(RemoteRefs::parse(&output))
    }

    fn has_commits(&self, ctx: &SyncContext, op: GitOperation) -> Result<bool, GitError> {
        let output = self.exec(
            ctx,
            op,
            &["rev-parse", "--verify", "--quiet", "HEAD"],
            &self.config_env(false),
        )?;
        Ok(output.status.success())
    }

    fn is_dirty(&self, ctx: &SyncContext, op: GitOperation) -> Result<bool, GitError> {
        Ok(!self.git(ctx, op, &["status", "--porcelain"])?.is_empty())
    }

    fn set_default_branch(&self, ctx: &SyncContext, op: GitOperation) -> Result<(), GitError> {
        let head = format!("refs/heads/{}", self.settings.default_branch);
        self.git(ctx, op, &["symbolic-ref", "HEAD", &head])?;
        Ok(())
    }

    fn dir_is_empty(&self, op: GitOperation) -> Result<bool, GitError> {
        let mut entries = fs::read_dir(&self.work_dir).map_err(|e| io_error(op, &self.work_dir, e))?;
        Ok(entries.next().is_none())
    }

    /// Turn a populated root into a checkout of the remote.
    fn attach(&self, ctx: &SyncContext) -> Result<(), GitError> {
        let op = GitOperation::Clone;
        let policy = self.settings.attach_policy;
        info!(root = %self.work_dir.display(), ?policy, "attaching populated workspace to remote");

        self.git(ctx, op, &["init", "--quiet"])?;
        self.configure_remote(ctx, op)?;

        let refs = self.remote_refs(ctx, op)?;
        let Some(branch) = refs.pick_branch(&self.settings.default_branch) else {
            debug!("remote has no branches yet; keeping local files as the first commit");
            return self.set_default_branch(ctx, op);
        };

        if policy == AttachPolicy::Refuse {
            return Err(GitError::new(
                op,
                GitErrorKind::Conflict,
                format!("remote already has branch '{branch}' and the workspace is not empty"),
            ));
        }

        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        self.git_remote(ctx, op, &["fetch", "--quiet", "origin", &refspec])?;

        let tracking = format!("origin/{branch}");
        let mut args = vec!["checkout", "--quiet"];
        match policy {
            AttachPolicy::Overwrite => args.extend(["-f", "--track", "-B"]),
            _ => args.extend(["--track", "-b"]),
        }
        args.extend([branch.as_str(), tracking.as_str()]);
        self.git(ctx, op, &args)?;
        Ok(())
    }
}

impl GitSyncClient for GitCliClient {
    fn clone_repo(&self, ctx: &SyncContext) -> Result<(), GitError> {
        let op = GitOperation::Clone;
        fs::create_dir_all(&self.work_dir).map_err(|e| io_error(op, &self.work_dir, e))?;

        if !self.dir_is_empty(op)? {
            return self.attach(ctx);
        }

        info!(root = %self.work_dir.display(), "cloning remote into empty workspace");
        self.git_remote(
            ctx,
            op,
            &["clone", "--quiet", "--no-local", "--origin", "origin", "--", self.remote_url(), "."],
        )?;
        if !self.has_commits(ctx, op)? {
            self.set_default_branch(ctx, op)?;
        }
        Ok(())
    }

    fn pull(&self, ctx: &SyncContext) -> Result<(), GitError> {
        let op = GitOperation::Pull;
        if self.is_dirty(ctx, op)? {
            return Err(GitError::new(
                op,
                GitErrorKind::Conflict,
                "workspace has uncommitted changes; commit them before pulling",
            ));
        }

        let branch = self.git(ctx, op, &["symbolic-ref", "--short", "HEAD"])?;
        let refs = self.remote_refs(ctx, op)?;
        if !refs.branches.contains(&branch) {
            debug!(%branch, "branch not on remote yet; nothing to pull");
            return Ok(());
        }

        info!(root = %self.work_dir.display(), %branch, "pulling from remote");
        self.git_remote(ctx, op, &["pull", "--quiet", "--ff-only", "origin", &branch])?;
        Ok(())
    }

    fn commit(&self, ctx: &SyncContext, message: &str) -> Result<Option<String>, GitError> {
        let op = GitOperation::Commit;
        self.git(ctx, op, &["add", "--all"])?;

        if !self.is_dirty(ctx, op)? {
            debug!(root = %self.work_dir.display(), "nothing to commit");
            return Ok(None);
        }

        self.run(ctx, op, &["commit", "--quiet", "-m", message], &self.identity_env())?;
        let commit_id = self.git(ctx, op, &["rev-parse", "HEAD"])?;
        info!(root = %self.work_dir.display(), commit = %commit_id, "committed workspace changes");
        Ok(Some(commit_id))
    }

    fn push(&self, ctx: &SyncContext) -> Result<(), GitError> {
        let op = GitOperation::Push;
        if !self.has_commits(ctx, op)? {
            debug!(root = %self.work_dir.display(), "no commits yet; nothing to push");
            return Ok(());
        }

        info!(root = %self.work_dir.display(), "pushing to remote");
        self.git_remote(ctx, op, &["push", "--quiet", "--set-upstream", "origin", "HEAD"])?;
        Ok(())
    }

    /// Clone when the root has no repository yet. Otherwise point `origin`
    /// at the configured URL and pull; a failed pull restores the previous
    /// `origin` URL.
    fn ensure_repo(&self, ctx: &SyncContext) -> Result<(), GitError> {
        if !self.is_repo() {
            return self.clone_repo(ctx);
        }
        let op = GitOperation::EnsureRepo;
        let previous = self.origin_url(ctx, op)?;
        self.set_origin(ctx, op, previous.as_deref(), self.remote_url())?;

        let result = self.pull(ctx);
        if result.is_err() && previous.as_deref() != Some(self.remote_url()) {
            self.restore_origin(previous.as_deref());
        }
        result
    }

    fn name(&self) -> &str {
        "git"
    }
}

fn io_error(op: GitOperation, path: &Path, source: std::io::Error) -> GitError {
    GitError::new(
        op,
        GitErrorKind::Unknown,
        format!("{}: {source}", path.display()),
    )
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn join_reader(handle: JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Wait for `child`, killing it once the context is cancelled or expires.
fn wait_with_context(
    child: &mut Child,
    ctx: &SyncContext,
    op: GitOperation,
) -> Result<ExitStatus, GitError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                return Err(GitError::new(
                    op,
                    GitErrorKind::Unknown,
                    format!("failed to wait for git: {e}"),
                ));
            }
        }

        if let Some(kind) = ctx.interrupted() {
            let _ = child.kill();
            let _ = child.wait();
            warn!(operation = %op, %kind, "git process killed");
            return Err(GitError::new(op, kind, format!("git process killed ({kind})")));
        }
        thread::sleep(POLL_INTERVAL);
    }
}
