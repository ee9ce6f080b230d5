//! Storage configuration structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What a move does when the destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovePolicy {
    /// Replace the destination silently.
    #[default]
    Overwrite,
    /// Refuse with `TargetExists`.
    Fail,
}

/// Storage engine configuration (the `[storage]` table of quill.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `<user_id>/<workspace_id>/` trees.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Include dot-files in tree listings unless the caller overrides it.
    #[serde(default)]
    pub show_hidden: bool,

    /// Collision behavior for moves.
    #[serde(default)]
    pub move_policy: MovePolicy,

    /// How long an operation waits for a busy workspace before failing.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl StorageConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            show_hidden: false,
            move_policy: MovePolicy::default(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data/workspaces")
}

fn default_lock_timeout_secs() -> u64 {
    30
}
