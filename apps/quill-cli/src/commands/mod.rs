pub mod files;
pub mod git;

use clap::Args;
use quill_workspace::WorkspaceKey;

/// Selects one workspace of one user.
#[derive(Args, Debug, Clone, Copy)]
pub struct WorkspaceArgs {
    /// Owner user id.
    #[arg(long)]
    pub user: u64,
    /// Workspace id.
    #[arg(long)]
    pub workspace: u64,
}

impl WorkspaceArgs {
    pub fn key(&self) -> WorkspaceKey {
        WorkspaceKey::new(self.user, self.workspace)
    }
}
