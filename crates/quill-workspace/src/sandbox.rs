// sandbox.rs: Containment of user-supplied paths inside a workspace root.
//
// A caller path goes through three gates before any file operation sees it:
//   1. percent-decoding (strict: malformed escapes are rejected)
//   2. lexical cleaning (separators, `.`, `..`, absolute forms, `.git`)
//   3. physical resolution: every symlink on the way is canonicalized and
//      must land inside the canonical root
//
// Lexical cleaning alone is not enough. A symlink inside the workspace can
// point anywhere, so the containment check runs on canonical paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::WorkspaceError;

/// Maximum accepted length of a caller-supplied path, in bytes.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Git metadata directory. Never addressable through the sandbox.
pub const GIT_DIR: &str = ".git";

/// Resolves workspace-relative paths against a fixed root.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The (non-canonical) workspace root this sandbox was created with.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `user_path` to an absolute path inside the root.
    pub fn resolve(&self, user_path: &str) -> Result<PathBuf, WorkspaceError> {
        resolve(&self.root, user_path)
    }

    /// Resolve `user_path` without following a symlink in the final segment.
    pub fn resolve_entry(&self, user_path: &str) -> Result<PathBuf, WorkspaceError> {
        resolve_entry(&self.root, user_path)
    }

    /// Canonical form of the root itself.
    pub fn canonical_root(&self) -> Result<PathBuf, WorkspaceError> {
        canonical_root(&self.root)
    }
}

/// Resolve a caller-supplied relative path against `root`.
///
/// The empty path denotes the root. Both `/` and `\` separate segments and
/// percent-encoded input is decoded before validation. The returned path is
/// canonical up to its deepest existing ancestor; the non-existent tail (for
/// files about to be created) is appended verbatim.
///
/// Fails with [`WorkspaceError::PathValidation`] when the path is absolute,
/// climbs above the root, names `.git`, is malformed, or reaches outside the
/// root through a symlink.
pub fn resolve(root: &Path, user_path: &str) -> Result<PathBuf, WorkspaceError> {
    let segments = clean_segments(user_path)?;
    resolve_segments(root, user_path, &segments)
}

/// Resolve `user_path` like [`resolve`], except that the final segment is
/// appended as-is. A leaf that is itself a symlink is returned as the link's
/// own path so callers can inspect it with `symlink_metadata`.
///
/// The empty path resolves to the canonical root.
pub fn resolve_entry(root: &Path, user_path: &str) -> Result<PathBuf, WorkspaceError> {
    let mut segments = clean_segments(user_path)?;
    let Some(leaf) = segments.pop() else {
        return canonical_root(root);
    };
    let parent = resolve_segments(root, user_path, &segments)?;
    Ok(parent.join(leaf))
}

fn resolve_segments(
    root: &Path,
    user_path: &str,
    segments: &[String],
) -> Result<PathBuf, WorkspaceError> {
    let canonical_root = canonical_root(root)?;

    let mut current = canonical_root.clone();
    let mut remaining = segments.iter();

    for segment in remaining.by_ref() {
        let candidate = current.join(segment);
        match fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = dunce::canonicalize(&candidate).map_err(|_| {
                    warn!(path = user_path, "rejected path through dangling symlink");
                    WorkspaceError::invalid(user_path, "path contains an unresolvable symlink")
                })?;
                if !target.starts_with(&canonical_root) {
                    warn!(
                        path = user_path,
                        target = %target.display(),
                        "rejected symlink escaping workspace root"
                    );
                    return Err(WorkspaceError::invalid(
                        user_path,
                        "symlink target escapes workspace root",
                    ));
                }
                current = target;
            }
            Ok(_) => current = candidate,
            Err(e) if is_missing(&e) => {
                // Nothing below a missing entry (or below a regular file)
                // exists, so no more symlinks can appear on the rest of the
                // path.
                current = candidate;
                break;
            }
            Err(source) => return Err(WorkspaceError::io(candidate, source)),
        }
    }
    for segment in remaining {
        current.push(segment);
    }

    if !current.starts_with(&canonical_root) {
        warn!(path = user_path, "rejected path escaping workspace root");
        return Err(WorkspaceError::invalid(
            user_path,
            "path escapes workspace root",
        ));
    }

    Ok(current)
}

/// True for lookups that fail because the entry does not exist, including
/// paths that continue below a regular file.
pub fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Decode and lexically clean a caller path into plain segments.
///
/// No filesystem access happens here; anything rejected at this stage is
/// rejected before the disk is touched.
pub fn clean_segments(user_path: &str) -> Result<Vec<String>, WorkspaceError> {
    if user_path.len() > MAX_PATH_LENGTH {
        return Err(WorkspaceError::invalid(
            user_path,
            "path exceeds maximum length",
        ));
    }

    let decoded = percent_decode(user_path)?;
    if decoded.contains('\0') {
        return Err(WorkspaceError::invalid(user_path, "path contains NUL byte"));
    }

    let normalized = decoded.replace('\\', "/");
    if is_absolute(&normalized) {
        warn!(path = user_path, "rejected absolute path");
        return Err(WorkspaceError::invalid(
            user_path,
            "absolute paths are not allowed",
        ));
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    warn!(path = user_path, "rejected path escaping workspace root");
                    return Err(WorkspaceError::invalid(
                        user_path,
                        "path escapes workspace root",
                    ));
                }
            }
            s if s.eq_ignore_ascii_case(GIT_DIR) => {
                return Err(WorkspaceError::invalid(
                    user_path,
                    "git metadata is not addressable",
                ));
            }
            s => {
                if cfg!(windows) && s.contains(':') {
                    return Err(WorkspaceError::invalid(
                        user_path,
                        "path segment contains ':'",
                    ));
                }
                segments.push(s.to_string());
            }
        }
    }

    Ok(segments)
}

/// Join cleaned segments back into the forward-slash relative form.
pub fn to_relative(segments: &[String]) -> String {
    segments.join("/")
}

fn canonical_root(root: &Path) -> Result<PathBuf, WorkspaceError> {
    dunce::canonicalize(root).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            WorkspaceError::NotFound {
                path: root.display().to_string(),
            }
        } else {
            WorkspaceError::io(root, source)
        }
    })
}

fn is_absolute(normalized: &str) -> bool {
    let bytes = normalized.as_bytes();
    if bytes.first() == Some(&b'/') {
        return true;
    }
    // Drive-letter forms such as `C:` or `C:/Windows`.
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Strict percent-decoding: every `%` must introduce two hex digits.
fn percent_decode(raw: &str) -> Result<String, WorkspaceError> {
    if !raw.contains('%') {
        return Ok(raw.to_string());
    }

    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !well_formed {
                return Err(WorkspaceError::invalid(raw, "malformed percent-encoding"));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| WorkspaceError::invalid(raw, "percent-encoded path is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/readme.md"), "# readme").unwrap();
        (dir, root)
    }

    fn assert_rejected(root: &Path, path: &str) {
        let result = resolve(root, path);
        assert!(
            matches!(result, Err(WorkspaceError::PathValidation { .. })),
            "expected rejection for {path:?}, got {result:?}"
        );
    }

    #[test]
    fn empty_path_is_root() {
        let (_dir, root) = setup();
        let resolved = resolve(&root, "").unwrap();
        assert_eq!(resolved, dunce::canonicalize(&root).unwrap());
        assert_eq!(resolve(&root, "./").unwrap(), resolved);
    }

    #[test]
    fn resolves_nested_existing_and_new_paths() {
        let (_dir, root) = setup();
        let canonical = dunce::canonicalize(&root).unwrap();

        assert_eq!(
            resolve(&root, "docs/readme.md").unwrap(),
            canonical.join("docs").join("readme.md")
        );
        assert_eq!(
            resolve(&root, "docs/new/deep/file.md").unwrap(),
            canonical.join("docs").join("new").join("deep").join("file.md")
        );
    }

    #[test]
    fn backslash_and_repeated_separators_are_cleaned() {
        let (_dir, root) = setup();
        let canonical = dunce::canonicalize(&root).unwrap();
        let expected = canonical.join("docs").join("readme.md");

        assert_eq!(resolve(&root, "docs\\readme.md").unwrap(), expected);
        assert_eq!(resolve(&root, "docs//./readme.md").unwrap(), expected);
    }

    #[test]
    fn inner_parent_segments_stay_inside() {
        let (_dir, root) = setup();
        let canonical = dunce::canonicalize(&root).unwrap();
        assert_eq!(
            resolve(&root, "docs/../notes/a.md").unwrap(),
            canonical.join("notes").join("a.md")
        );
    }

    #[test]
    fn traversal_rejected_in_all_forms() {
        let (_dir, root) = setup();
        for path in [
            "../../../etc/passwd",
            "test/../../../etc/passwd",
            "..",
            "docs/../../x",
            "..\\..\\etc\\passwd",
            "..%2F..%2Fetc%2Fpasswd",
            "%2e%2e/%2e%2e/etc/passwd",
            "%2E%2E%5C%2E%2E%5Cetc%5Cpasswd",
            "docs%2F..%2F..%2Fescape",
        ] {
            assert_rejected(&root, path);
        }
    }

    #[test]
    fn absolute_paths_rejected() {
        let (_dir, root) = setup();
        for path in ["/etc/shadow", "\\etc\\shadow", "C:\\Windows", "c:/x", "%2Fetc%2Fshadow"] {
            assert_rejected(&root, path);
        }
    }

    #[test]
    fn malformed_encoding_rejected() {
        let (_dir, root) = setup();
        for path in ["docs/%zz.md", "docs/%2", "%", "%c3%28"] {
            assert_rejected(&root, path);
        }
    }

    #[test]
    fn encoded_names_are_decoded() {
        let (_dir, root) = setup();
        let canonical = dunce::canonicalize(&root).unwrap();
        assert_eq!(
            resolve(&root, "docs/my%20notes.md").unwrap(),
            canonical.join("docs").join("my notes.md")
        );
    }

    #[test]
    fn git_metadata_is_not_addressable() {
        let (_dir, root) = setup();
        assert_rejected(&root, ".git/config");
        assert_rejected(&root, "docs/.GIT/HEAD");
        assert_rejected(&root, "%2egit/config");
        // Other dot-names are ordinary files.
        assert!(resolve(&root, ".gitignore").is_ok());
    }

    #[test]
    fn nul_byte_rejected() {
        let (_dir, root) = setup();
        assert_rejected(&root, "docs/a\0b");
        assert_rejected(&root, "docs/a%00b");
    }

    #[test]
    fn overlong_path_rejected() {
        let (_dir, root) = setup();
        let long = "a/".repeat(MAX_PATH_LENGTH);
        assert_rejected(&root, &long);
    }

    #[test]
    fn missing_root_is_not_found() {
        let dir = tempdir().unwrap();
        let result = resolve(&dir.path().join("absent"), "a.md");
        assert!(matches!(result, Err(WorkspaceError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_rejected() {
        let (dir, root) = setup();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        std::os::unix::fs::symlink(outside.join("secret.txt"), root.join("secret.md")).unwrap();

        assert_rejected(&root, "link");
        assert_rejected(&root, "link/secret.txt");
        assert_rejected(&root, "link/new-file.txt");
        assert_rejected(&root, "secret.md");
    }

    #[cfg(unix)]
    #[test]
    fn sibling_with_common_prefix_is_outside() {
        let (dir, root) = setup();
        let evil = dir.path().join("root-evil");
        fs::create_dir_all(&evil).unwrap();
        std::os::unix::fs::symlink(&evil, root.join("sneaky")).unwrap();

        assert_rejected(&root, "sneaky/payload");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_root_is_followed() {
        let (_dir, root) = setup();
        std::os::unix::fs::symlink(root.join("docs"), root.join("alias")).unwrap();

        let canonical = dunce::canonicalize(&root).unwrap();
        assert_eq!(
            resolve(&root, "alias/readme.md").unwrap(),
            canonical.join("docs").join("readme.md")
        );
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_rejected() {
        let (dir, root) = setup();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), root.join("dangling")).unwrap();
        assert_rejected(&root, "dangling");
        assert_rejected(&root, "dangling/child.md");
    }

    #[test]
    fn path_below_a_file_resolves_as_missing() {
        let (_dir, root) = setup();
        let canonical = dunce::canonicalize(&root).unwrap();
        assert_eq!(
            resolve(&root, "docs/readme.md/child.md").unwrap(),
            canonical.join("docs").join("readme.md").join("child.md")
        );
    }

    #[cfg(unix)]
    #[test]
    fn resolve_entry_keeps_leaf_symlink() {
        let (dir, root) = setup();
        let canonical = dunce::canonicalize(&root).unwrap();
        std::os::unix::fs::symlink(root.join("docs"), root.join("alias")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), root.join("dangling")).unwrap();

        assert_eq!(resolve_entry(&root, "alias").unwrap(), canonical.join("alias"));
        assert_eq!(resolve_entry(&root, "dangling").unwrap(), canonical.join("dangling"));
        // Links before the leaf are still followed.
        assert_eq!(
            resolve_entry(&root, "alias/readme.md").unwrap(),
            canonical.join("docs").join("readme.md")
        );
        assert_eq!(resolve_entry(&root, "").unwrap(), canonical);
        assert!(matches!(
            resolve_entry(&root, "../x"),
            Err(WorkspaceError::PathValidation { .. })
        ));
    }

    #[test]
    fn clean_segments_produces_relative_form() {
        let segments = clean_segments("a\\b/./c/../d").unwrap();
        assert_eq!(to_relative(&segments), "a/b/d");
        assert!(clean_segments("").unwrap().is_empty());
    }
}
