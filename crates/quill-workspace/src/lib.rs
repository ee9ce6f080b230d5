//! # quill-workspace
//!
//! Sandboxed storage for user workspaces.
//!
//! Each user owns workspaces, each a directory tree at
//! `base_dir/<user_id>/<workspace_id>`. Callers only ever supply relative
//! paths; this crate maps them onto disk without letting them escape.
//!
//! ## Key components
//!
//! - [`PathSandbox`]: resolves untrusted relative paths inside a root,
//!   rejecting traversal, absolute paths and symlink escapes.
//! - [`FileStore`]: get/save/delete/move on single files; saves are atomic
//!   (temp file + rename).
//! - [`FileTreeIndexer`]: recursive [`FileNode`] listing and file name search.
//! - [`WorkspaceLifecycle`]: creates and destroys workspace roots.
//! - [`StatsCollector`]: file counts and sizes per workspace and in total.
//! - [`WorkspaceLocks`]: per-workspace mutual exclusion shared with git sync.
//! - [`WorkspaceStorage`]: keyed facade running everything under the lock.

pub mod config;
pub mod error;
pub mod files;
pub mod key;
pub mod lifecycle;
pub mod locks;
pub mod sandbox;
pub mod stats;
pub mod storage;
pub mod tree;

pub use config::{MovePolicy, StorageConfig};
pub use error::{ErrorClass, WorkspaceError};
pub use files::FileStore;
pub use key::WorkspaceKey;
pub use lifecycle::WorkspaceLifecycle;
pub use locks::WorkspaceLocks;
pub use sandbox::PathSandbox;
pub use stats::{FileCountStats, StatsCollector};
pub use storage::WorkspaceStorage;
pub use tree::{FileNode, FileTreeIndexer, ListOptions, NodeKind};
