//! Git sync configuration structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SyncError;

/// Per-workspace git configuration, supplied by the caller on every call.
///
/// The token is used for the duration of one operation and never written to
/// the repository config or the remote URL.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Remote repository URL (https, ssh or git; local paths only when
    /// [`SyncSettings::allow_local_remotes`] is set)
    pub remote_url: String,

    /// Username for HTTP basic auth
    #[serde(default)]
    pub username: String,

    /// Token or password for HTTP basic auth
    #[serde(default)]
    pub token: String,

    /// Author/committer name
    #[serde(default = "default_commit_name")]
    pub commit_name: String,

    /// Author/committer email
    #[serde(default = "default_commit_email")]
    pub commit_email: String,

    /// Commit and push after every file mutation
    #[serde(default)]
    pub auto_commit: bool,

    /// Template for automatic commit messages; `${action}` and `${filename}`
    /// are substituted
    #[serde(default = "default_commit_message_template")]
    pub commit_message_template: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote_url: String::new(),
            username: String::new(),
            token: String::new(),
            commit_name: default_commit_name(),
            commit_email: default_commit_email(),
            auto_commit: false,
            commit_message_template: default_commit_message_template(),
        }
    }
}

impl fmt::Debug for GitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitConfig")
            .field("enabled", &self.enabled)
            .field("remote_url", &self.remote_url)
            .field("username", &self.username)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("commit_name", &self.commit_name)
            .field("commit_email", &self.commit_email)
            .field("auto_commit", &self.auto_commit)
            .field("commit_message_template", &self.commit_message_template)
            .finish()
    }
}

impl GitConfig {
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            remote_url: remote_url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.username = username.into();
        self.token = token.into();
        self
    }

    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.commit_name = name.into();
        self.commit_email = email.into();
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.token.is_empty()
    }

    /// Reject values that cannot be safely handed to git.
    ///
    /// Local paths and `file://` URLs would let one workspace clone or push
    /// into any directory the process can reach, including other tenants'
    /// workspaces, so they pass only when `settings` allows local remotes.
    pub fn validate(&self, settings: &SyncSettings) -> Result<(), SyncError> {
        let url = self.remote_url.trim();
        if url.is_empty() {
            return Err(SyncError::InvalidConfig("remote URL is required".into()));
        }
        if url.starts_with('-') {
            return Err(SyncError::InvalidConfig(
                "remote URL must not start with '-'".into(),
            ));
        }
        match RemoteKind::of(url) {
            RemoteKind::Network => {}
            RemoteKind::Local if settings.allow_local_remotes => {}
            RemoteKind::Local => {
                return Err(SyncError::InvalidConfig(
                    "local filesystem remotes are not allowed".into(),
                ))
            }
            RemoteKind::Unsupported => {
                return Err(SyncError::InvalidConfig(
                    "unsupported remote transport".into(),
                ))
            }
        }
        let fields = [
            ("remote URL", &self.remote_url),
            ("username", &self.username),
            ("token", &self.token),
            ("commit name", &self.commit_name),
            ("commit email", &self.commit_email),
        ];
        for (name, value) in fields {
            if value.chars().any(char::is_control) {
                return Err(SyncError::InvalidConfig(format!(
                    "{name} contains control characters"
                )));
            }
        }
        if self.commit_name.trim().is_empty() || self.commit_email.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "commit name and email are required".into(),
            ));
        }
        Ok(())
    }

    /// Render the automatic commit message for a file mutation.
    pub fn render_commit_message(&self, action: &str, filename: &str) -> String {
        let template = if self.commit_message_template.trim().is_empty() {
            default_commit_message_template()
        } else {
            self.commit_message_template.clone()
        };
        template
            .replace("${action}", action)
            .replace("${filename}", filename)
    }
}

/// How git would reach a remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    /// http(s), ssh or git protocol, including scp-like `user@host:path`
    Network,
    /// A filesystem path or a `file://` URL
    Local,
    /// Any other scheme or a `transport::address` remote helper
    Unsupported,
}

impl RemoteKind {
    pub fn of(url: &str) -> Self {
        let url = url.trim();
        if let Some((scheme, _)) = url.split_once("://") {
            return match scheme.to_ascii_lowercase().as_str() {
                "http" | "https" | "ssh" | "git" | "git+ssh" | "ssh+git" => RemoteKind::Network,
                "file" => RemoteKind::Local,
                _ => RemoteKind::Unsupported,
            };
        }
        if url.contains("::") {
            return RemoteKind::Unsupported;
        }
        // scp-like syntax: a colon before any slash. A single letter before
        // the colon is a Windows drive.
        match url.split_once(':') {
            Some((host, _)) if !host.contains('/') && !host.contains('\\') => {
                let is_drive = host.len() == 1 && host.chars().all(|c| c.is_ascii_alphabetic());
                if is_drive || host.is_empty() {
                    RemoteKind::Local
                } else {
                    RemoteKind::Network
                }
            }
            _ => RemoteKind::Local,
        }
    }
}

fn default_commit_name() -> String {
    "Quill".to_string()
}

fn default_commit_email() -> String {
    "quill@localhost".to_string()
}

fn default_commit_message_template() -> String {
    "${action} ${filename}".to_string()
}

/// How to attach a populated workspace to a remote that already has history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachPolicy {
    /// Check out the remote branch, keeping local files. Fails when a local
    /// untracked file would be overwritten.
    #[default]
    Merge,
    /// Check out the remote branch, replacing colliding local files.
    Overwrite,
    /// Refuse to attach when the remote already has commits.
    Refuse,
}

/// Process-wide git sync settings (the `[sync]` table of quill.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// git executable
    #[serde(default = "default_git_binary")]
    pub git_binary: PathBuf,

    /// Deadline for a single coordinator operation, in seconds
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,

    #[serde(default)]
    pub attach_policy: AttachPolicy,

    /// Branch used when the remote has none yet
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Accept local paths and `file://` remotes. Only for single-tenant
    /// setups and tests.
    #[serde(default)]
    pub allow_local_remotes: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            git_binary: default_git_binary(),
            network_timeout_secs: default_network_timeout_secs(),
            attach_policy: AttachPolicy::default(),
            default_branch: default_branch(),
            allow_local_remotes: false,
        }
    }
}

impl SyncSettings {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

fn default_network_timeout_secs() -> u64 {
    120
}

fn default_branch() -> String {
    "main".to_string()
}
