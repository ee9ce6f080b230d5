// key.rs: Workspace identity.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifies one workspace of one user.
///
/// Ids are numeric so the derived directory `base/<user>/<workspace>` can
/// never carry separators or traversal segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceKey {
    pub user_id: u64,
    pub workspace_id: u64,
}

impl WorkspaceKey {
    pub fn new(user_id: u64, workspace_id: u64) -> Self {
        Self {
            user_id,
            workspace_id,
        }
    }

    /// `base_dir/<user_id>/<workspace_id>`.
    pub fn root_in(&self, base_dir: &Path) -> PathBuf {
        base_dir
            .join(self.user_id.to_string())
            .join(self.workspace_id.to_string())
    }
}

impl fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.workspace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_derived_from_ids() {
        let key = WorkspaceKey::new(7, 42);
        assert_eq!(
            key.root_in(Path::new("/srv/quill")),
            PathBuf::from("/srv/quill/7/42")
        );
        assert_eq!(key.to_string(), "7/42");
    }
}
