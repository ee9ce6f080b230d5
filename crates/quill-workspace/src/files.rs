// files.rs: Byte-level file operations inside a sandboxed workspace.
//
// Every path argument goes through the PathSandbox on its own before any
// filesystem call. Writes land in a temp file in the destination directory
// and are renamed into place, so readers see the old content or the new
// content and never a partial write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::MovePolicy;
use crate::error::WorkspaceError;
use crate::sandbox::{self, PathSandbox};

/// CRUD over the files of a single workspace.
#[derive(Debug, Clone)]
pub struct FileStore {
    sandbox: PathSandbox,
    move_policy: MovePolicy,
}

impl FileStore {
    pub fn new(sandbox: PathSandbox, move_policy: MovePolicy) -> Self {
        Self {
            sandbox,
            move_policy,
        }
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// Read a file's content.
    ///
    /// Fails with `NotFound` when the path is missing or names a directory.
    pub fn get_content(&self, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let full_path = self.sandbox.resolve(path)?;

        match fs::metadata(&full_path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(not_found(path)),
            Err(source) => return Err(map_missing(path, &full_path, source)),
        }

        fs::read(&full_path).map_err(|source| map_missing(path, &full_path, source))
    }

    /// Write `content` to `path`, creating missing parent directories.
    pub fn save(&self, path: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let full_path = self.entry(path)?;
        self.reject_root(path, &full_path, "cannot write to the workspace root")?;

        if full_path.is_dir() {
            return Err(WorkspaceError::invalid(path, "path denotes a directory"));
        }

        let parent = full_path
            .parent()
            .ok_or_else(|| WorkspaceError::invalid(path, "path has no parent directory"))?;
        fs::create_dir_all(parent).map_err(|source| parent_error(path, parent, source))?;

        let mut tmp =
            NamedTempFile::new_in(parent).map_err(|source| WorkspaceError::io(parent, source))?;
        tmp.write_all(content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|source| WorkspaceError::io(tmp.path(), source))?;
        apply_permissions(&tmp, &full_path)?;
        tmp.persist(&full_path)
            .map_err(|e| WorkspaceError::io(&full_path, e.error))?;

        debug!(path, bytes = content.len(), "saved file");
        Ok(())
    }

    /// Delete a file or an empty directory.
    pub fn delete(&self, path: &str) -> Result<(), WorkspaceError> {
        let full_path = self.entry(path)?;
        self.reject_root(path, &full_path, "cannot delete the workspace root")?;

        let meta = fs::symlink_metadata(&full_path)
            .map_err(|source| map_missing(path, &full_path, source))?;

        if meta.is_dir() {
            let mut entries = fs::read_dir(&full_path)
                .map_err(|source| WorkspaceError::io(&full_path, source))?;
            if entries.next().is_some() {
                return Err(WorkspaceError::DirectoryNotEmpty {
                    path: path.to_string(),
                });
            }
            fs::remove_dir(&full_path).map_err(|source| map_missing(path, &full_path, source))?;
        } else {
            fs::remove_file(&full_path).map_err(|source| map_missing(path, &full_path, source))?;
        }

        debug!(path, "deleted");
        Ok(())
    }

    /// Rename `src` to `dest` within the workspace.
    ///
    /// An existing `dest` is replaced under [`MovePolicy::Overwrite`] and
    /// rejected with `TargetExists` under [`MovePolicy::Fail`].
    pub fn move_file(&self, src: &str, dest: &str) -> Result<(), WorkspaceError> {
        let from = self.entry(src)?;
        let to = self.entry(dest)?;
        self.reject_root(src, &from, "cannot move the workspace root")?;
        self.reject_root(dest, &to, "cannot replace the workspace root")?;

        let src_meta =
            fs::symlink_metadata(&from).map_err(|source| map_missing(src, &from, source))?;

        if from == to {
            return Ok(());
        }
        if src_meta.is_dir() && to.starts_with(&from) {
            return Err(WorkspaceError::invalid(
                dest,
                "cannot move a directory into itself",
            ));
        }

        if let Ok(dest_meta) = fs::symlink_metadata(&to) {
            match self.move_policy {
                MovePolicy::Fail => {
                    return Err(WorkspaceError::TargetExists {
                        path: dest.to_string(),
                    })
                }
                MovePolicy::Overwrite => {
                    if dest_meta.is_dir() && !src_meta.is_dir() {
                        return Err(WorkspaceError::invalid(
                            dest,
                            "destination is a directory",
                        ));
                    }
                }
            }
        }

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|source| parent_error(dest, parent, source))?;
        }
        fs::rename(&from, &to).map_err(|source| map_missing(src, &from, source))?;

        debug!(src, dest, "moved");
        Ok(())
    }

    /// Resolve a path that is about to be modified. Symlinks are never
    /// listed, so a symlink leaf is refused instead of acting on its target.
    fn entry(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let full_path = self.sandbox.resolve_entry(path)?;
        let is_symlink = fs::symlink_metadata(&full_path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if is_symlink {
            warn!(path, "rejected modification of a symlink");
            return Err(WorkspaceError::invalid(path, "path is a symbolic link"));
        }
        Ok(full_path)
    }

    fn reject_root(&self, path: &str, full_path: &Path, reason: &str) -> Result<(), WorkspaceError> {
        if full_path == self.sandbox.canonical_root()? {
            return Err(WorkspaceError::invalid(path, reason));
        }
        Ok(())
    }
}

fn not_found(path: &str) -> WorkspaceError {
    WorkspaceError::NotFound {
        path: path.to_string(),
    }
}

fn map_missing(path: &str, full_path: &Path, source: io::Error) -> WorkspaceError {
    if sandbox::is_missing(&source) {
        not_found(path)
    } else {
        WorkspaceError::io(PathBuf::from(full_path), source)
    }
}

/// A parent that cannot be created because a file is in the way.
fn parent_error(path: &str, parent: &Path, source: io::Error) -> WorkspaceError {
    match source.kind() {
        io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory => {
            WorkspaceError::invalid(path, "a parent of the path is a file")
        }
        _ => WorkspaceError::io(parent, source),
    }
}

/// Temp files are created owner-only; keep the target's existing mode, or
/// use the usual 0644 for new files.
#[cfg(unix)]
fn apply_permissions(tmp: &NamedTempFile, target: &Path) -> Result<(), WorkspaceError> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = match fs::metadata(target) {
        Ok(meta) => meta.permissions(),
        Err(_) => fs::Permissions::from_mode(0o644),
    };
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(|source| WorkspaceError::io(tmp.path(), source))
}

#[cfg(not(unix))]
fn apply_permissions(_tmp: &NamedTempFile, _target: &Path) -> Result<(), WorkspaceError> {
    Ok(())
}
