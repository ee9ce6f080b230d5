// error.rs: Error types for the workspace storage subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse category of a failure, for callers that map errors to
/// response codes (400 / 404 / 500) without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller supplied something invalid.
    BadRequest,
    /// The target does not exist.
    NotFound,
    /// Anything else: disk, locking, external tools.
    Internal,
}

/// Errors that can occur during workspace storage operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A user-supplied path escaped the workspace root (security violation).
    /// No filesystem access is attempted once this is detected.
    #[error("invalid path '{path}': {reason}")]
    PathValidation { path: String, reason: String },

    /// The requested file or directory does not exist in the workspace.
    #[error("not found: '{path}'")]
    NotFound { path: String },

    /// A move would replace an existing file and the policy forbids it.
    #[error("target already exists: '{path}'")]
    TargetExists { path: String },

    /// Directory deletion was requested but the directory still has entries.
    #[error("directory not empty: '{path}'")]
    DirectoryNotEmpty { path: String },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The workspace lock could not be acquired in time.
    #[error("timed out waiting for workspace {workspace}")]
    LockTimeout { workspace: String },
}

impl WorkspaceError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        WorkspaceError::PathValidation {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::IoError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walk(root: &std::path::Path, err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| root.to_path_buf());
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        WorkspaceError::io(path, source)
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            WorkspaceError::PathValidation { .. }
            | WorkspaceError::TargetExists { .. }
            | WorkspaceError::DirectoryNotEmpty { .. } => ErrorClass::BadRequest,
            WorkspaceError::NotFound { .. } => ErrorClass::NotFound,
            WorkspaceError::IoError { .. } | WorkspaceError::LockTimeout { .. } => {
                ErrorClass::Internal
            }
        }
    }

    /// The caller's input was rejected (maps to 400).
    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::BadRequest
    }

    pub fn is_path_validation(&self) -> bool {
        matches!(self, WorkspaceError::PathValidation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkspaceError::NotFound { .. })
    }
}
