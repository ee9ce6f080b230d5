// git.rs: Git sync subcommands: setup, disable, commit, pull, status.

use anyhow::Context;
use clap::{Args, Subcommand};
use quill_sync::{CommitOutcome, GitConfig, GitCoordinator};

use super::WorkspaceArgs;

/// Remote and identity for one git call. Nothing here is persisted.
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Remote repository URL.
    #[arg(long)]
    pub remote: String,
    /// Username for HTTPS basic auth.
    #[arg(long, default_value = "")]
    pub username: String,
    /// Access token for HTTPS basic auth.
    #[arg(long, env = "QUILL_GIT_TOKEN", hide_env_values = true, default_value = "")]
    pub token: String,
    /// Commit author name.
    #[arg(long, default_value = "Quill")]
    pub author_name: String,
    /// Commit author email.
    #[arg(long, default_value = "quill@localhost")]
    pub author_email: String,
}

impl RemoteArgs {
    fn git_config(&self) -> GitConfig {
        GitConfig::new(&self.remote)
            .with_credentials(&self.username, &self.token)
            .with_identity(&self.author_name, &self.author_email)
    }
}

#[derive(Subcommand)]
pub enum GitCommands {
    /// Clone the remote into the workspace, or attach existing files to it.
    Setup {
        #[command(flatten)]
        target: WorkspaceArgs,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Stop syncing. Removes .git and keeps every file.
    Disable {
        #[command(flatten)]
        target: WorkspaceArgs,
    },
    /// Commit all changes and push them.
    Commit {
        #[command(flatten)]
        target: WorkspaceArgs,
        #[command(flatten)]
        remote: RemoteArgs,
        /// Commit message.
        #[arg(short, long)]
        message: String,
    },
    /// Fast-forward the workspace from its remote.
    Pull {
        #[command(flatten)]
        target: WorkspaceArgs,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Show whether git sync is enabled.
    Status {
        #[command(flatten)]
        target: WorkspaceArgs,
    },
}

pub fn execute(cmd: &GitCommands, coordinator: &GitCoordinator) -> anyhow::Result<()> {
    match cmd {
        GitCommands::Setup { target, remote } => {
            coordinator
                .setup_git_repo(target.key(), &remote.git_config())
                .with_context(|| format!("git setup failed for workspace {}", target.key()))?;
            println!("Git sync enabled for workspace {}", target.key());
        }

        GitCommands::Disable { target } => {
            coordinator
                .disable_git_repo(target.key())
                .with_context(|| format!("failed to disable git for workspace {}", target.key()))?;
            println!("Git sync disabled for workspace {}", target.key());
        }

        GitCommands::Commit {
            target,
            remote,
            message,
        } => {
            let outcome = coordinator
                .stage_commit_and_push(target.key(), &remote.git_config(), message)
                .with_context(|| format!("commit failed for workspace {}", target.key()))?;
            match outcome {
                CommitOutcome::Committed { commit_id } => {
                    let short = commit_id.get(..8).unwrap_or(&commit_id);
                    println!("Committed and pushed {short}");
                }
                CommitOutcome::NothingToCommit => println!("Nothing to commit"),
            }
        }

        GitCommands::Pull { target, remote } => {
            coordinator
                .pull(target.key(), &remote.git_config())
                .with_context(|| format!("pull failed for workspace {}", target.key()))?;
            println!("Workspace {} is up to date", target.key());
        }

        GitCommands::Status { target } => {
            let state = if coordinator.is_enabled(target.key()) {
                "enabled"
            } else {
                "disabled"
            };
            println!("Git sync for workspace {}: {state}", target.key());
        }
    }

    Ok(())
}
