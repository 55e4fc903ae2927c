//! Running the `git` binary against the shared store and its checkouts.
//!
//! This module is the only place a child process is spawned. It provides:
//! - A process runner with a clean git environment (no system/user config)
//! - Typed errors carrying the failed command line and captured stderr
//! - Small ref-inspection helpers shared by the orchestrator and the merge
//!   heuristic
//!
//! The runner is purely mechanical: no retries, no interpretation of output
//! beyond success/failure mapping. Retry classification lives in [`retry`],
//! checkout orchestration in [`worktree`].

pub mod merged;
pub mod retry;
pub mod status;
pub mod worktree;

use std::path::Path;
use std::process::Output;

use thiserror::Error;

use crate::types::Sha;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command exited non-zero.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The checkout was expected to be in detached HEAD state but is on a branch.
    #[error("checkout is on branch '{branch}', expected detached HEAD")]
    NotDetached { branch: String },

    /// A rebase stopped on conflicts; the working tree is left in the
    /// conflicted state for manual resolution.
    #[error("rebase conflict: {details}")]
    RebaseConflict { details: String },

    /// A ref could not be resolved.
    #[error("ref not found: {refname}")]
    RefNotFound { refname: String },

    /// Output that should have been a SHA was not one.
    #[error("invalid SHA: {0}")]
    InvalidSha(String),

    /// Spawn failure or other IO error (binary not found, permission denied).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for creating commits.
///
/// Passed via `-c` flags so commits can be created even on machines where
/// global/system git config is absent or disabled.
#[derive(Debug, Clone)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        CommitIdentity {
            name: "grove".to_string(),
            email: "grove@localhost".to_string(),
        }
    }
}

/// Create a git Command with clean environment (no system/user config).
///
/// Ignoring system and user git configuration (rerere, hooks, aliases) keeps
/// behavior consistent across machines. Terminal prompts are disabled so a
/// credential prompt can never hang an operation.
pub(crate) fn git_command(workdir: &Path) -> std::process::Command {
    use std::process::Command;

    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Create a git Command configured for commit operations.
///
/// Extends [`git_command`] with identity configuration passed via `-c`
/// flags; no persistent `.git/config` changes are made.
pub(crate) fn git_commit_command(workdir: &Path, identity: &CommitIdentity) -> std::process::Command {
    let mut cmd = git_command(workdir);

    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));

    cmd
}

/// Run a git command in the given working directory.
///
/// Returns the command output on success, or a [`GitError`] carrying the
/// command line and captured stderr on non-zero exit.
pub fn run_git(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let output = git_command(workdir).args(args).output()?;

    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let command = format!("git {}", args.join(" "));
        Err(GitError::CommandFailed { command, stderr })
    }
}

/// Run a git command and return trimmed stdout.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Get the SHA of a revision.
pub fn rev_parse(workdir: &Path, rev: &str) -> GitResult<Sha> {
    let sha_str = run_git_stdout(workdir, &["rev-parse", "--verify", rev])?;
    Sha::parse(&sha_str).map_err(GitError::InvalidSha)
}

/// Check whether a revision resolves at all.
pub fn ref_exists(workdir: &Path, rev: &str) -> bool {
    git_command(workdir)
        .args(["rev-parse", "--verify", "--quiet", rev])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if one commit is an ancestor of another.
pub fn is_ancestor(workdir: &Path, potential_ancestor: &str, descendant: &str) -> GitResult<bool> {
    let output = git_command(workdir)
        .args(["merge-base", "--is-ancestor", potential_ancestor, descendant])
        .output()?;

    // Exit 0 = is ancestor, exit 1 = not ancestor, other = error
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(GitError::CommandFailed {
                command: format!(
                    "git merge-base --is-ancestor {} {}",
                    potential_ancestor, descendant
                ),
                stderr,
            })
        }
    }
}

/// The checked-out branch name, or `None` when HEAD is detached.
pub fn current_branch(workdir: &Path) -> GitResult<Option<String>> {
    let head = run_git_stdout(workdir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if head == "HEAD" {
        Ok(None)
    } else {
        Ok(Some(head))
    }
}

/// Whether the checkout is in detached HEAD state.
pub fn is_detached(workdir: &Path) -> GitResult<bool> {
    Ok(current_branch(workdir)?.is_none())
}

/// Whether the repository has any commits at all.
///
/// A freshly-initialized bare store has no refs whatsoever; several
/// orchestrator paths branch on this. Checked via ref enumeration rather
/// than HEAD, because a store populated only through its fetch refspec has
/// remote-tracking refs but no local HEAD commit.
pub fn has_any_commits(workdir: &Path) -> bool {
    run_git_stdout(workdir, &["for-each-ref", "--count=1", "--format=%(refname)"])
        .map(|out| !out.is_empty())
        .unwrap_or(false)
}

/// Whether a local branch exists.
pub fn local_branch_exists(workdir: &Path, branch: &str) -> bool {
    ref_exists(workdir, &format!("refs/heads/{}", branch))
}

/// Whether a remote-tracking ref for the branch exists.
pub fn remote_branch_exists(workdir: &Path, branch: &str) -> bool {
    ref_exists(workdir, &format!("refs/remotes/origin/{}", branch))
}

/// Fetch refs from origin.
pub fn fetch(workdir: &Path, refspecs: &[&str]) -> GitResult<()> {
    let mut args = vec!["fetch", "origin"];
    if !refspecs.is_empty() {
        args.push("--");
        args.extend(refspecs);
    }
    run_git(workdir, &args)?;
    Ok(())
}

/// The configured URL of the `origin` remote, if any.
pub fn remote_url(workdir: &Path) -> Option<String> {
    let url = run_git_stdout(workdir, &["remote", "get-url", "origin"]).ok()?;
    if url.is_empty() { None } else { Some(url) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{commit_file, init_workspace_repo};

    #[test]
    fn run_git_captures_stderr_on_failure() {
        let (dir, _) = init_workspace_repo();
        let err = run_git(dir.path(), &["rev-parse", "--verify", "no-such-ref"]).unwrap_err();
        match err {
            GitError::CommandFailed { command, stderr } => {
                assert!(command.starts_with("git rev-parse"));
                assert!(!stderr.is_empty());
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn rev_parse_returns_head_sha() {
        let (dir, _) = init_workspace_repo();
        let sha = rev_parse(dir.path(), "HEAD").unwrap();
        assert_eq!(sha.as_str().len(), 40);
    }

    #[test]
    fn current_branch_reports_branch_and_detached() {
        let (dir, _) = init_workspace_repo();
        assert_eq!(current_branch(dir.path()).unwrap().as_deref(), Some("main"));

        run_git(dir.path(), &["checkout", "--detach", "HEAD"]).unwrap();
        assert_eq!(current_branch(dir.path()).unwrap(), None);
        assert!(is_detached(dir.path()).unwrap());
    }

    #[test]
    fn is_ancestor_distinguishes_exit_codes() {
        let (dir, first) = init_workspace_repo();
        let second = commit_file(dir.path(), "b.txt", "b");

        assert!(is_ancestor(dir.path(), first.as_str(), second.as_str()).unwrap());
        assert!(!is_ancestor(dir.path(), second.as_str(), first.as_str()).unwrap());
    }

    #[test]
    fn has_any_commits_false_for_empty_repo() {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "--initial-branch=main"]).unwrap();
        assert!(!has_any_commits(dir.path()));
    }

    #[test]
    fn branch_existence_helpers() {
        let (dir, _) = init_workspace_repo();
        assert!(local_branch_exists(dir.path(), "main"));
        assert!(!local_branch_exists(dir.path(), "feature/x"));
        assert!(!remote_branch_exists(dir.path(), "main"));
    }
}
