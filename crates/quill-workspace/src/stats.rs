// stats.rs: File count and size aggregation, per workspace and system-wide.
//
// Stats are derived on demand by walking the tree and never persisted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::WorkspaceError;
use crate::key::WorkspaceKey;
use crate::tree::is_git_dir;

/// Number of regular files and their total byte size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCountStats {
    pub total_files: u64,
    pub total_size: u64,
}

impl std::ops::AddAssign for FileCountStats {
    fn add_assign(&mut self, other: Self) {
        self.total_files += other.total_files;
        self.total_size += other.total_size;
    }
}

/// Walks workspace trees under a base directory.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    base_dir: PathBuf,
}

impl StatsCollector {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Stats for one workspace. A workspace without a root counts as empty.
    pub fn get_file_stats(&self, key: WorkspaceKey) -> Result<FileCountStats, WorkspaceError> {
        count_files(&key.root_in(&self.base_dir))
    }

    /// Stats summed over every workspace of every user.
    pub fn get_total_file_stats(&self) -> Result<FileCountStats, WorkspaceError> {
        let mut total = FileCountStats::default();
        for key in self.workspace_keys()? {
            total += self.get_file_stats(key)?;
        }
        Ok(total)
    }

    /// Every `<user_id>/<workspace_id>` directory under the base directory.
    /// Entries whose names are not numeric ids are ignored.
    pub fn workspace_keys(&self) -> Result<Vec<WorkspaceKey>, WorkspaceError> {
        let mut keys = Vec::new();
        for (user_id, user_dir) in numeric_subdirs(&self.base_dir)? {
            for (workspace_id, _) in numeric_subdirs(&user_dir)? {
                keys.push(WorkspaceKey::new(user_id, workspace_id));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn count_files(root: &Path) -> Result<FileCountStats, WorkspaceError> {
    let mut stats = FileCountStats::default();
    if !root.is_dir() {
        return Ok(stats);
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_git_dir(entry));

    for entry in walker {
        let entry = entry.map_err(|e| WorkspaceError::walk(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry
            .metadata()
            .map_err(|e| WorkspaceError::walk(root, e))?;
        stats.total_files += 1;
        stats.total_size += meta.len();
    }

    Ok(stats)
}

fn numeric_subdirs(dir: &Path) -> Result<Vec<(u64, PathBuf)>, WorkspaceError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(WorkspaceError::io(dir, source)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::io(dir, source))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
            found.push((id, entry.path()));
        }
    }
    Ok(found)
}
