// files.rs: Workspace and file subcommands: init, remove, ls, find, cat, put, rm, mv, stats.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use quill_workspace::{FileNode, WorkspaceKey, WorkspaceStorage};

use super::WorkspaceArgs;

#[derive(Subcommand)]
pub enum FileCommands {
    /// Create the workspace directory (idempotent).
    Init {
        #[command(flatten)]
        target: WorkspaceArgs,
    },
    /// Delete the workspace and everything in it.
    Remove {
        #[command(flatten)]
        target: WorkspaceArgs,
    },
    /// Show the workspace file tree.
    Ls {
        #[command(flatten)]
        target: WorkspaceArgs,
        /// Include dot-files.
        #[arg(long)]
        hidden: bool,
        /// Print the tree as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Find files by exact name.
    Find {
        #[command(flatten)]
        target: WorkspaceArgs,
        name: String,
    },
    /// Print a file to stdout.
    Cat {
        #[command(flatten)]
        target: WorkspaceArgs,
        path: String,
    },
    /// Write a file from --from or stdin.
    Put {
        #[command(flatten)]
        target: WorkspaceArgs,
        path: String,
        /// Local file to read the content from (defaults to stdin).
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Delete a file or an empty directory.
    Rm {
        #[command(flatten)]
        target: WorkspaceArgs,
        path: String,
    },
    /// Move or rename a file.
    Mv {
        #[command(flatten)]
        target: WorkspaceArgs,
        src: String,
        dest: String,
    },
    /// Show file counts and total size.
    Stats {
        /// Owner user id.
        #[arg(long, required_unless_present = "all")]
        user: Option<u64>,
        /// Workspace id.
        #[arg(long, required_unless_present = "all")]
        workspace: Option<u64>,
        /// Sum over every workspace of every user.
        #[arg(long, conflicts_with_all = ["user", "workspace"])]
        all: bool,
    },
}

pub fn execute(cmd: &FileCommands, storage: &WorkspaceStorage) -> anyhow::Result<()> {
    match cmd {
        FileCommands::Init { target } => {
            let root = storage
                .initialize_user_workspace(target.key())
                .with_context(|| format!("failed to initialize workspace {}", target.key()))?;
            println!("Workspace {} ready at {}", target.key(), root.display());
        }

        FileCommands::Remove { target } => {
            storage
                .delete_user_workspace(target.key())
                .with_context(|| format!("failed to remove workspace {}", target.key()))?;
            println!("Workspace {} removed", target.key());
        }

        FileCommands::Ls {
            target,
            hidden,
            json,
        } => {
            let mut options = storage.default_list_options();
            options.show_hidden |= *hidden;
            let nodes = storage.list(target.key(), options)?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else if nodes.is_empty() {
                println!("(empty)");
            } else {
                print_tree(&nodes, 0);
            }
        }

        FileCommands::Find { target, name } => {
            for path in storage.find_by_name(target.key(), name)? {
                println!("{path}");
            }
        }

        FileCommands::Cat { target, path } => {
            let content = storage.get_content(target.key(), path)?;
            std::io::stdout().write_all(&content)?;
        }

        FileCommands::Put { target, path, from } => {
            let content = match from {
                Some(file) => std::fs::read(file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut buf)
                        .context("failed to read stdin")?;
                    buf
                }
            };
            storage.save(target.key(), path, &content)?;
            println!("Saved {path} ({} bytes)", content.len());
        }

        FileCommands::Rm { target, path } => {
            storage.delete(target.key(), path)?;
            println!("Deleted {path}");
        }

        FileCommands::Mv { target, src, dest } => {
            storage.move_file(target.key(), src, dest)?;
            println!("Moved {src} -> {dest}");
        }

        FileCommands::Stats { user, workspace, .. } => {
            let stats = match (user, workspace) {
                (Some(user), Some(workspace)) => {
                    storage.get_file_stats(WorkspaceKey::new(*user, *workspace))?
                }
                _ => storage.get_total_file_stats()?,
            };
            println!("Files: {}", stats.total_files);
            println!("Size:  {} bytes", stats.total_size);
        }
    }

    Ok(())
}

fn print_tree(nodes: &[FileNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        if node.is_directory() {
            println!("{indent}{}/", node.name);
            print_tree(&node.children, depth + 1);
        } else {
            let modified = node
                .modified_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{indent}{:<40} {:>10}  {modified}", node.name, node.size);
        }
    }
}
