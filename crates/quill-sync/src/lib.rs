//! # quill-sync
//!
//! Optional git synchronization for quill workspaces.
//!
//! A workspace is synced when its root contains a `.git` directory. The
//! [`GitCoordinator`] runs every git step under the same per-workspace lock
//! as file operations, with a deadline on each call.
//!
//! ## Key components
//!
//! - [`GitSyncClient`]: pluggable backend (clone, pull, commit, push, ensure)
//! - [`GitCliClient`]: backend driving the system `git` binary
//! - [`RecordingClient`]: backend that records calls without touching git
//! - [`GitCoordinator`]: setup, disable, commit+push and pull per workspace

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod git;
pub mod recording;

pub use client::{CancelToken, GitClientFactory, GitSyncClient, SyncContext};
pub use config::{AttachPolicy, GitConfig, RemoteKind, SyncSettings};
pub use coordinator::{CommitOutcome, GitCoordinator};
pub use error::{GitError, GitErrorKind, GitOperation, SyncError};
pub use git::GitCliClient;
pub use recording::{CallCounts, RecordingClient};
