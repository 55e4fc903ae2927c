//! Shared test fixtures: real git repositories in temp directories.
//!
//! Lifecycle and orchestrator tests exercise the actual `git` binary; these
//! helpers build the moving parts: an upstream "remote" repository, a bare
//! shared store wired to it, and a workspace root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::git::retry::RetryConfig;
use crate::git::worktree::StoreContext;
use crate::git::{CommitIdentity, git_commit_command, run_git, run_git_stdout};
use crate::types::Sha;

/// Retry policy for tests: two fast attempts so transient-path tests don't sleep.
pub fn test_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
    }
}

/// Initialize a standalone repository with one commit on `main`.
///
/// Returns the temp dir and the initial commit's SHA.
pub fn init_workspace_repo() -> (TempDir, Sha) {
    let dir = TempDir::new().unwrap();
    init_repo_at(dir.path());
    let sha = commit_file(dir.path(), "README.md", "# fixture\n");
    (dir, sha)
}

/// Write a file and commit it, returning the new commit's SHA.
pub fn commit_file(repo: &Path, name: &str, content: &str) -> Sha {
    commit_with_message(repo, name, content, &format!("add {}", name))
}

/// Write a file and commit it with an explicit message.
pub fn commit_with_message(repo: &Path, name: &str, content: &str, message: &str) -> Sha {
    std::fs::write(repo.join(name), content).unwrap();
    run_git(repo, &["add", "--", name]).unwrap();
    let output = git_commit_command(repo, &CommitIdentity::default())
        .args(["commit", "-m", message])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "commit failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let sha_str = run_git_stdout(repo, &["rev-parse", "HEAD"]).unwrap();
    Sha::parse(sha_str).unwrap()
}

fn init_repo_at(path: &Path) {
    run_git(path, &["init", "--initial-branch=main"]).unwrap();
}

/// A project-shaped fixture: upstream remote, bare shared store, workspace root.
pub struct StoreFixture {
    pub dir: TempDir,
    /// The upstream repository the store fetches from.
    pub remote: PathBuf,
    /// The shared bare object store.
    pub bare: PathBuf,
    /// Root directory for workspace checkouts.
    pub workspaces: PathBuf,
}

impl StoreFixture {
    /// A fixture whose remote has one commit on `main`, already fetched into
    /// the store.
    pub fn new() -> Self {
        let fixture = Self::new_empty();
        commit_file(&fixture.remote, "README.md", "# fixture\n");
        run_git(&fixture.bare, &["fetch", "origin"]).unwrap();
        fixture
    }

    /// A fixture whose remote and store both have no commits at all.
    pub fn new_empty() -> Self {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let bare = dir.path().join("store.git");
        let workspaces = dir.path().join("workspaces");

        std::fs::create_dir_all(&remote).unwrap();
        init_repo_at(&remote);

        std::fs::create_dir_all(&bare).unwrap();
        run_git(&bare, &["init", "--bare", "--initial-branch=main"]).unwrap();
        run_git(&bare, &["remote", "add", "origin", remote.to_str().unwrap()]).unwrap();
        run_git(
            &bare,
            &[
                "config",
                "remote.origin.fetch",
                "+refs/heads/*:refs/remotes/origin/*",
            ],
        )
        .unwrap();

        std::fs::create_dir_all(&workspaces).unwrap();

        StoreFixture {
            dir,
            remote,
            bare,
            workspaces,
        }
    }

    /// Orchestrator context for this fixture's store.
    pub fn ctx(&self) -> StoreContext {
        StoreContext {
            bare_repo: self.bare.clone(),
            remote_url: self.remote.to_string_lossy().to_string(),
            default_branch: "main".to_string(),
            identity: CommitIdentity::default(),
            retry: test_retry_config(),
        }
    }

    /// The path a workspace with this name would occupy.
    pub fn workspace_path(&self, name: &str) -> PathBuf {
        self.workspaces.join(name)
    }
}
