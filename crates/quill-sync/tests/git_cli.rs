// git_cli.rs: GitCoordinator driving the real git binary against local
// bare repositories. Skipped when git is not installed.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use quill_sync::{
    AttachPolicy, CommitOutcome, GitCliClient, GitConfig, GitCoordinator, GitErrorKind,
    GitSyncClient, SyncContext, SyncError, SyncSettings,
};
use quill_workspace::{StorageConfig, WorkspaceKey, WorkspaceStorage};
use tempfile::{tempdir, TempDir};

const KEY: WorkspaceKey = WorkspaceKey {
    user_id: 1,
    workspace_id: 1,
};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test User", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

struct Fixture {
    dir: TempDir,
    storage: Arc<WorkspaceStorage>,
    coordinator: GitCoordinator,
}

impl Fixture {
    fn new(policy: AttachPolicy) -> Self {
        let dir = tempdir().unwrap();
        let storage = Arc::new(WorkspaceStorage::new(&StorageConfig::new(
            dir.path().join("workspaces"),
        )));
        storage.initialize_user_workspace(KEY).unwrap();

        let settings = SyncSettings {
            attach_policy: policy,
            network_timeout_secs: 60,
            allow_local_remotes: true,
            ..SyncSettings::default()
        };
        let coordinator = GitCoordinator::with_git_cli(Arc::clone(&storage), settings);
        Self {
            dir,
            storage,
            coordinator,
        }
    }

    /// Empty bare remote whose HEAD points at `main`.
    fn bare_remote(&self) -> String {
        self.bare_remote_named("remote.git")
    }

    fn bare_remote_named(&self, name: &str) -> String {
        let remote = self.dir.path().join(name);
        fs::create_dir_all(&remote).unwrap();
        git(&remote, &["init", "--bare", "--quiet"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        remote.display().to_string()
    }

    /// Push a commit with `files` to `remote` from a scratch clone.
    fn push_to_remote(&self, remote: &str, files: &[(&str, &str)]) {
        let scratch = self.dir.path().join("scratch");
        if !scratch.exists() {
            git(self.dir.path(), &["clone", "--quiet", remote, "scratch"]);
            git(&scratch, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        } else {
            git(&scratch, &["pull", "--quiet", "--ff-only", "origin", "main"]);
        }
        for (name, content) in files {
            let path = scratch.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        git(&scratch, &["add", "--all"]);
        git(&scratch, &["commit", "--quiet", "-m", "remote change"]);
        git(&scratch, &["push", "--quiet", "origin", "main"]);
    }

    fn remote_files(&self, remote: &str) -> Vec<String> {
        let listing = git(Path::new(remote), &["ls-tree", "-r", "--name-only", "main"]);
        listing.lines().map(str::to_string).collect()
    }

    fn read(&self, path: &str) -> Vec<u8> {
        self.storage.get_content(KEY, path).unwrap()
    }
}

fn config(remote: &str) -> GitConfig {
    GitConfig::new(remote).with_identity("Quill Test", "quill@example.com")
}

#[test]
fn clone_into_empty_workspace() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("docs/readme.md", "# remote")]);

    fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap();

    assert!(fx.coordinator.is_enabled(KEY));
    assert_eq!(fx.read("docs/readme.md"), b"# remote");
}

#[test]
fn attach_populated_workspace_to_empty_remote_and_push() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.storage.save(KEY, "notes/local.md", b"local").unwrap();

    fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap();
    let outcome = fx
        .coordinator
        .stage_commit_and_push(KEY, &config(&remote), "initial import")
        .unwrap();

    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    assert_eq!(fx.remote_files(&remote), vec!["notes/local.md"]);

    // A clean tree has nothing to commit.
    let outcome = fx
        .coordinator
        .stage_commit_and_push(KEY, &config(&remote), "again")
        .unwrap();
    assert_eq!(outcome, CommitOutcome::NothingToCommit);
}

#[test]
fn attach_merge_keeps_local_files_next_to_remote_ones() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("remote.md", "from remote")]);
    fx.storage.save(KEY, "local.md", b"from local").unwrap();

    fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap();

    assert_eq!(fx.read("remote.md"), b"from remote");
    assert_eq!(fx.read("local.md"), b"from local");
}

#[test]
fn attach_merge_collision_fails_and_leaves_files_untouched() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("same.md", "remote version")]);
    fx.storage.save(KEY, "same.md", b"local version").unwrap();

    let err = fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap_err();

    assert_eq!(err.git_kind(), Some(GitErrorKind::Conflict));
    assert!(!fx.coordinator.is_enabled(KEY));
    assert_eq!(fx.read("same.md"), b"local version");
}

#[test]
fn attach_refuse_rejects_remote_with_history() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Refuse);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("remote.md", "r")]);
    fx.storage.save(KEY, "local.md", b"l").unwrap();

    let err = fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap_err();

    assert_eq!(err.git_kind(), Some(GitErrorKind::Conflict));
    assert!(!fx.coordinator.is_enabled(KEY));
    assert!(fx.storage.get_content(KEY, "remote.md").is_err());
}

#[test]
fn attach_overwrite_replaces_colliding_files() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Overwrite);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("same.md", "remote version")]);
    fx.storage.save(KEY, "same.md", b"local version").unwrap();

    fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap();

    assert_eq!(fx.read("same.md"), b"remote version");
}

#[test]
fn unreachable_remote_fails_without_touching_files() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    fx.storage.save(KEY, "keep.md", b"precious").unwrap();
    let missing = fx.dir.path().join("does-not-exist.git");

    let err = fx
        .coordinator
        .setup_git_repo(KEY, &config(&missing.display().to_string()))
        .unwrap_err();

    assert!(matches!(err, SyncError::Git(_)));
    assert!(!fx.coordinator.is_enabled(KEY));
    assert_eq!(fx.read("keep.md"), b"precious");
    let entries: Vec<_> = fs::read_dir(fx.storage.workspace_root(KEY))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["keep.md"]);
}

#[test]
fn pull_fast_forwards_and_refuses_dirty_tree() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("a.md", "v1")]);
    fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap();

    fx.push_to_remote(&remote, &[("a.md", "v2")]);
    fx.coordinator.pull(KEY, &config(&remote)).unwrap();
    assert_eq!(fx.read("a.md"), b"v2");

    fx.storage.save(KEY, "a.md", b"local edit").unwrap();
    let err = fx.coordinator.pull(KEY, &config(&remote)).unwrap_err();
    assert_eq!(err.git_kind(), Some(GitErrorKind::Conflict));
    assert_eq!(fx.read("a.md"), b"local edit");
}

#[test]
fn disable_keeps_working_tree() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("a.md", "content")]);
    fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap();

    fx.coordinator.disable_git_repo(KEY).unwrap();

    assert!(!fx.coordinator.is_enabled(KEY));
    assert_eq!(fx.read("a.md"), b"content");
}

#[test]
fn failed_refresh_restores_previous_origin() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("a.md", "v1")]);
    fx.coordinator.setup_git_repo(KEY, &config(&remote)).unwrap();
    let root = fx.storage.workspace_root(KEY);
    let before = git(&root, &["remote", "get-url", "origin"]);

    let other = fx.bare_remote_named("other.git");
    fx.storage.save(KEY, "a.md", b"local edit").unwrap();
    let err = fx.coordinator.setup_git_repo(KEY, &config(&other)).unwrap_err();
    assert_eq!(err.git_kind(), Some(GitErrorKind::Conflict));

    assert_eq!(git(&root, &["remote", "get-url", "origin"]), before);
    assert!(fx.coordinator.is_enabled(KEY));
    assert_eq!(fx.read("a.md"), b"local edit");
}

#[test]
fn local_remote_rejected_without_opt_in() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("secret.md", "other tenant")]);

    let strict = GitCoordinator::with_git_cli(Arc::clone(&fx.storage), SyncSettings::default());
    let err = strict.setup_git_repo(KEY, &config(&remote)).unwrap_err();
    assert!(matches!(err, SyncError::InvalidConfig(_)), "got {err:?}");
    assert!(!strict.is_enabled(KEY));
}

#[test]
fn git_refuses_file_transport_without_opt_in() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new(AttachPolicy::Merge);
    let remote = fx.bare_remote();
    fx.push_to_remote(&remote, &[("secret.md", "other tenant")]);

    // Bypasses config validation: the transport restriction alone must stop
    // the clone.
    let root = fx.storage.workspace_root(KEY);
    let client = GitCliClient::new(&root, config(&remote), SyncSettings::default());
    assert!(client.clone_repo(&SyncContext::background()).is_err());
    assert!(!root.join("secret.md").exists());
}
