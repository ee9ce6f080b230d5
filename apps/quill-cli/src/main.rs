//! # quill-cli
//!
//! Command-line interface for quill workspaces.
//!
//! Operates directly on a storage base directory:
//! - `quill init/remove` to create and destroy a workspace
//! - `quill ls/find/cat/put/rm/mv` for files inside a workspace
//! - `quill stats` for file counts and sizes
//! - `quill git setup/disable/commit/pull/status` for git sync

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use quill_sync::GitCoordinator;
use quill_workspace::WorkspaceStorage;
use tracing_subscriber::EnvFilter;

use crate::config::QuillConfig;

/// quill: sandboxed workspace storage with optional git sync.
#[derive(Parser)]
#[command(name = "quill", version, about)]
struct Cli {
    /// Config file.
    #[arg(long, default_value = "quill.toml")]
    config: PathBuf,

    /// Storage base directory (overrides `storage.base_dir`).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Files(commands::files::FileCommands),
    /// Git synchronization for a workspace.
    Git {
        #[command(subcommand)]
        command: commands::git::GitCommands,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `quill cat` output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("quill_workspace=info".parse()?)
                .add_directive("quill_sync=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let mut config = QuillConfig::load_or_default(&cli.config)?;
    if let Some(base_dir) = cli.base_dir {
        config.storage.base_dir = base_dir;
    }
    tracing::debug!(base_dir = %config.storage.base_dir.display(), "storage configured");

    let storage = Arc::new(WorkspaceStorage::new(&config.storage));

    match &cli.command {
        Commands::Files(command) => commands::files::execute(command, &storage),
        Commands::Git { command } => {
            let coordinator = GitCoordinator::with_git_cli(storage, config.sync.clone());
            commands::git::execute(command, &coordinator)
        }
    }
}
