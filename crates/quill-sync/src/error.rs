//! Error types for git synchronization

use std::fmt;

use quill_workspace::{ErrorClass, WorkspaceError};
use thiserror::Error;

/// The git-facing step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOperation {
    Clone,
    Pull,
    Commit,
    Push,
    EnsureRepo,
}

impl fmt::Display for GitOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GitOperation::Clone => "clone",
            GitOperation::Pull => "pull",
            GitOperation::Commit => "commit",
            GitOperation::Push => "push",
            GitOperation::EnsureRepo => "ensure-repo",
        };
        f.write_str(name)
    }
}

/// Why a git operation failed, as far as it can be told from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    /// Credentials missing, wrong, or lacking permission.
    Auth,
    /// Remote unreachable or transport failure.
    Network,
    /// Local and remote history or files collide.
    Conflict,
    /// The operation ran past its deadline and was killed.
    TimedOut,
    /// The caller cancelled the operation.
    Cancelled,
    Unknown,
}

impl fmt::Display for GitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GitErrorKind::Auth => "auth",
            GitErrorKind::Network => "network",
            GitErrorKind::Conflict => "conflict",
            GitErrorKind::TimedOut => "timed out",
            GitErrorKind::Cancelled => "cancelled",
            GitErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A failed Clone/Pull/Commit/Push/EnsureRepo, tagged with the operation.
#[derive(Debug, Clone, Error)]
#[error("git {operation} failed ({kind}): {message}")]
pub struct GitError {
    pub operation: GitOperation,
    pub kind: GitErrorKind,
    pub message: String,
}

const AUTH_MARKERS: &[&str] = &[
    "authentication failed",
    "could not read username",
    "could not read password",
    "terminal prompts disabled",
    "invalid username or password",
    "returned error: 401",
    "returned error: 403",
    "permission denied",
    "access denied",
];

const CONFLICT_MARKERS: &[&str] = &[
    "non-fast-forward",
    "[rejected]",
    "fetch first",
    "would be overwritten",
    "not possible to fast-forward",
    "diverging branches",
    "untracked working tree files",
    "uncommitted changes",
    "conflict",
];

const NETWORK_MARKERS: &[&str] = &[
    "could not resolve host",
    "could not resolve proxy",
    "connection refused",
    "connection timed out",
    "connection reset",
    "failed to connect",
    "network is unreachable",
    "unable to access",
    "operation timed out",
    "does not appear to be a git repository",
    "could not read from remote repository",
    "the remote end hung up",
];

impl GitError {
    pub fn new(operation: GitOperation, kind: GitErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Build an error from git's stderr, inferring the kind from its text.
    pub fn classify(operation: GitOperation, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        let kind = if has(AUTH_MARKERS) {
            GitErrorKind::Auth
        } else if has(CONFLICT_MARKERS) {
            GitErrorKind::Conflict
        } else if has(NETWORK_MARKERS) {
            GitErrorKind::Network
        } else {
            GitErrorKind::Unknown
        };

        Self::new(operation, kind, stderr.trim())
    }

    /// Worth retrying later without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, GitErrorKind::Network | GitErrorKind::TimedOut)
    }
}

/// Errors surfaced by the git coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("commit message must not be empty")]
    EmptyCommitMessage,

    #[error("git sync is not enabled for workspace {workspace}")]
    NotEnabled { workspace: String },

    #[error("invalid git configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Git(_) => ErrorClass::Internal,
            SyncError::Workspace(e) => e.class(),
            SyncError::EmptyCommitMessage
            | SyncError::NotEnabled { .. }
            | SyncError::InvalidConfig(_) => ErrorClass::BadRequest,
        }
    }

    /// The git failure kind, when this is a git failure.
    pub fn git_kind(&self) -> Option<GitErrorKind> {
        match self {
            SyncError::Git(e) => Some(e.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_git_failures() {
        let cases = [
            (
                "fatal: Authentication failed for 'https://example.com/repo.git/'",
                GitErrorKind::Auth,
            ),
            (
                "fatal: unable to access 'https://example.com/r.git/': The requested URL returned error: 403",
                GitErrorKind::Auth,
            ),
            (
                "fatal: unable to access 'https://nowhere.invalid/r.git/': Could not resolve host: nowhere.invalid",
                GitErrorKind::Network,
            ),
            (
                "fatal: '/tmp/missing.git' does not appear to be a git repository",
                GitErrorKind::Network,
            ),
            (
                " ! [rejected]        main -> main (fetch first)",
                GitErrorKind::Conflict,
            ),
            (
                "error: The following untracked working tree files would be overwritten by checkout:",
                GitErrorKind::Conflict,
            ),
            ("fatal: something odd happened", GitErrorKind::Unknown),
        ];

        for (stderr, expected) in cases {
            assert_eq!(
                GitError::classify(GitOperation::Push, stderr).kind,
                expected,
                "{stderr}"
            );
        }
    }

    #[test]
    fn display_names_operation_and_message() {
        let err = GitError::new(GitOperation::Pull, GitErrorKind::Network, "remote hung up");
        assert_eq!(err.to_string(), "git pull failed (network): remote hung up");
        assert!(err.is_transient());
    }

    #[test]
    fn sync_error_classes() {
        assert_eq!(SyncError::EmptyCommitMessage.class(), ErrorClass::BadRequest);
        let git: SyncError =
            GitError::new(GitOperation::Clone, GitErrorKind::Auth, "denied").into();
        assert_eq!(git.class(), ErrorClass::Internal);
        assert_eq!(git.git_kind(), Some(GitErrorKind::Auth));

        let missing: SyncError = WorkspaceError::NotFound {
            path: "x".into(),
        }
        .into();
        assert_eq!(missing.class(), ErrorClass::NotFound);
    }
}
