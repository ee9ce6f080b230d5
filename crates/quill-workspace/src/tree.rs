// tree.rs: Recursive file tree listing and name lookup.
//
// Listing order is part of the API contract: directories first, then files,
// each group sorted by name. `.git` is never listed. Symlinks are skipped
// rather than followed, so a listing cannot wander outside the workspace.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::WorkspaceError;
use crate::sandbox::{PathSandbox, GIT_DIR};

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Dir,
}

/// One file or directory in a workspace listing.
///
/// `path` is relative to the workspace root and always uses `/`. A nested
/// node's path is its parent's path, a slash, and its own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Byte size for files; always 0 for directories.
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub children: Vec<FileNode>,
}

impl FileNode {
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Dir
    }
}

/// Caller-controlled listing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Include entries whose name starts with `.`.
    pub show_hidden: bool,
}

/// Walks a workspace to build trees and search by file name.
#[derive(Debug, Clone)]
pub struct FileTreeIndexer {
    sandbox: PathSandbox,
}

impl FileTreeIndexer {
    pub fn new(sandbox: PathSandbox) -> Self {
        Self { sandbox }
    }

    /// List the whole workspace as a tree of nodes.
    pub fn list(&self, options: ListOptions) -> Result<Vec<FileNode>, WorkspaceError> {
        let root = self.sandbox.canonical_root()?;
        let nodes = walk_tree(&root, "", options)?;
        debug!(root = %root.display(), top_level = nodes.len(), "listed workspace");
        Ok(nodes)
    }

    /// All relative paths of files whose leaf name equals `filename`.
    ///
    /// Fails with `NotFound` when nothing matches.
    pub fn find_by_name(&self, filename: &str) -> Result<Vec<String>, WorkspaceError> {
        if filename.is_empty() {
            return Err(WorkspaceError::invalid(filename, "filename must not be empty"));
        }

        let root = self.sandbox.canonical_root()?;
        let target = OsStr::new(filename);
        let mut matches = Vec::new();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !is_git_dir(entry));

        for entry in walker {
            let entry = entry.map_err(|e| WorkspaceError::walk(&root, e))?;
            if entry.file_type().is_file() && entry.file_name() == target {
                if let Ok(rel) = entry.path().strip_prefix(&root) {
                    matches.push(to_slash_path(rel));
                }
            }
        }

        if matches.is_empty() {
            return Err(WorkspaceError::NotFound {
                path: filename.to_string(),
            });
        }

        matches.sort();
        Ok(matches)
    }
}

fn walk_tree(
    dir: &Path,
    rel_dir: &str,
    options: ListOptions,
) -> Result<Vec<FileNode>, WorkspaceError> {
    let entries = fs::read_dir(dir).map_err(|source| WorkspaceError::io(dir, source))?;

    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::io(dir, source))?;
        let name = entry.file_name().to_string_lossy().to_string();

        if name.eq_ignore_ascii_case(GIT_DIR) {
            continue;
        }
        if !options.show_hidden && name.starts_with('.') {
            continue;
        }

        let file_type = entry
            .file_type()
            .map_err(|source| WorkspaceError::io(entry.path(), source))?;
        if file_type.is_symlink() {
            continue;
        }

        let meta = entry
            .metadata()
            .map_err(|source| WorkspaceError::io(entry.path(), source))?;
        let path = if rel_dir.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", rel_dir, name)
        };
        let modified_at = meta.modified().ok().map(DateTime::<Utc>::from);

        if file_type.is_dir() {
            let children = walk_tree(&entry.path(), &path, options)?;
            dirs.push(FileNode {
                name,
                path,
                kind: NodeKind::Dir,
                size: 0,
                modified_at,
                children,
            });
        } else {
            files.push(FileNode {
                name,
                path,
                kind: NodeKind::File,
                size: meta.len(),
                modified_at,
                children: Vec::new(),
            });
        }
    }

    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    files.sort_by(|a, b| a.name.cmp(&b.name));
    dirs.extend(files);
    Ok(dirs)
}

pub(crate) fn is_git_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case(GIT_DIR)
}

fn to_slash_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
