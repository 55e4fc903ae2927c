//! Checkout orchestration over the shared bare store.
//!
//! Every workspace is a lightweight checkout (`git worktree`) of its
//! project's bare object store: one shared object database, many independent
//! working directories. Claimed and pooled checkouts are kept in **detached
//! HEAD mode** to avoid git's restriction that a branch can only be checked
//! out in one worktree at a time; only `branched` workspaces sit on a real
//! branch.
//!
//! The store's records and the filesystem are two sources of truth that can
//! diverge after crashes or manual deletion, so removal has a dual path:
//! orchestrated `worktree remove` first, direct filesystem delete as the
//! fallback. Moves must always go through `git worktree move`, never a plain
//! rename, or the store's path bookkeeping goes stale.

use std::path::{Path, PathBuf};

use crate::types::Sha;

use super::retry::{RetryConfig, with_retry};
use super::{
    CommitIdentity, GitError, GitResult, fetch, git_commit_command, has_any_commits,
    local_branch_exists, ref_exists, remote_branch_exists, remote_url, rev_parse, run_git,
    run_git_stdout,
};

/// Everything the orchestrator needs to know about a project's shared store.
#[derive(Debug, Clone)]
pub struct StoreContext {
    /// Path to the bare object store.
    pub bare_repo: PathBuf,

    /// Canonical remote URL, mirrored into every checkout.
    pub remote_url: String,

    /// The project's default branch.
    pub default_branch: String,

    /// Identity for commits the orchestrator itself creates (orphan bootstrap).
    pub identity: CommitIdentity,

    /// Retry policy for network-dependent steps.
    pub retry: RetryConfig,
}

/// One entry from `git worktree list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutEntry {
    pub path: PathBuf,
    pub head: Option<Sha>,
    /// Checked-out branch, `None` when detached.
    pub branch: Option<String>,
}

/// Resolve a branch to its most-authoritative reference in the store.
///
/// The remote-tracking ref wins over the local ref: the shared store's local
/// branches can be stale relative to upstream, while `origin/<branch>` is
/// refreshed by every fetch.
fn resolve_tracking_ref(store: &Path, branch: &str) -> GitResult<(String, Sha)> {
    let remote_ref = format!("refs/remotes/origin/{}", branch);
    if ref_exists(store, &remote_ref) {
        let sha = rev_parse(store, &remote_ref)?;
        return Ok((remote_ref, sha));
    }

    let local_ref = format!("refs/heads/{}", branch);
    if ref_exists(store, &local_ref) {
        let sha = rev_parse(store, &local_ref)?;
        return Ok((local_ref, sha));
    }

    Err(GitError::RefNotFound {
        refname: branch.to_string(),
    })
}

/// Create a checkout on a named branch.
///
/// If `branch` already exists it is attached as-is; otherwise it is created
/// from the most-authoritative ref of `base_branch` (defaulting to the
/// store's default branch). An empty store, one with no commits at all,
/// falls back to [`bootstrap_orphan`].
pub fn create_named_checkout(
    ctx: &StoreContext,
    path: &Path,
    branch: &str,
    base_branch: Option<&str>,
) -> GitResult<()> {
    let store = ctx.bare_repo.as_path();

    if !has_any_commits(store) {
        bootstrap_orphan(ctx, path, branch)?;
        return Ok(());
    }

    let path_str = path.to_string_lossy();
    if local_branch_exists(store, branch) {
        run_git(store, &["worktree", "add", "--", &path_str, branch])?;
    } else {
        let base = base_branch.unwrap_or(&ctx.default_branch);
        let (start_ref, _) = resolve_tracking_ref(store, base)?;
        run_git(
            store,
            &["worktree", "add", "-b", branch, "--", &path_str, &start_ref],
        )?;
    }

    sync_remote_config(ctx, path)?;
    ensure_local_default_branch(ctx, path)?;
    Ok(())
}

/// Create a checkout pinned to the latest commit of `tracking_branch`, in
/// detached HEAD state. Returns the resolved commit for persistence.
pub fn create_detached_checkout(
    ctx: &StoreContext,
    path: &Path,
    tracking_branch: &str,
) -> GitResult<Sha> {
    let store = ctx.bare_repo.as_path();
    let (_, sha) = resolve_tracking_ref(store, tracking_branch)?;

    let path_str = path.to_string_lossy();
    run_git(
        store,
        &["worktree", "add", "--detach", "--", &path_str, sha.as_str()],
    )?;
    Ok(sha)
}

/// Refresh a detached checkout to the latest commit of `tracking_branch`,
/// discarding all local modifications and untracked files.
///
/// The fetch is best-effort: with the network down the reset still proceeds
/// against whatever the store already knows.
pub fn reset_detached_checkout(
    ctx: &StoreContext,
    path: &Path,
    tracking_branch: &str,
) -> GitResult<Sha> {
    let store = ctx.bare_repo.as_path();

    let fetched = with_retry("fetch tracking branch", ctx.retry, || {
        fetch(store, &[tracking_branch])
    });
    if let Err(e) = fetched {
        tracing::warn!(
            branch = tracking_branch,
            error = %e,
            "fetch failed, resetting to locally-known state"
        );
    }

    let (_, sha) = resolve_tracking_ref(store, tracking_branch)?;

    run_git(path, &["checkout", "--force", "--detach", sha.as_str()])?;
    run_git(path, &["clean", "-fd"])?;
    Ok(sha)
}

/// Promote a detached checkout to a new named branch at its current commit.
///
/// Fails with [`GitError::NotDetached`] when the checkout is already on a
/// branch: callers must not silently re-point an existing branch.
pub fn promote_detached_to_branch(path: &Path, branch: &str) -> GitResult<()> {
    if let Some(current) = super::current_branch(path)? {
        return Err(GitError::NotDetached { branch: current });
    }
    run_git(path, &["checkout", "-b", branch])?;
    Ok(())
}

/// Remove a checkout.
///
/// Tries the orchestrated removal first so the store's bookkeeping stays
/// consistent; when the store has no record of the checkout (the two sources
/// of truth diverged) falls back to a direct recursive delete plus a prune
/// of dangling worktree metadata.
pub fn remove_checkout(ctx: &StoreContext, path: &Path) -> GitResult<()> {
    let store = ctx.bare_repo.as_path();
    let path_str = path.to_string_lossy();

    match run_git(store, &["worktree", "remove", "--force", "--", &path_str]) {
        Ok(_) => return Ok(()),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "worktree remove failed, falling back to filesystem delete"
            );
        }
    }

    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(GitError::Io(e)),
    }

    // Clean up the store's stale record of the deleted directory.
    let _ = run_git(store, &["worktree", "prune"]);
    Ok(())
}

/// Move a checkout directory, keeping the store's bookkeeping in sync.
pub fn move_checkout(ctx: &StoreContext, old_path: &Path, new_path: &Path) -> GitResult<()> {
    let store = ctx.bare_repo.as_path();
    let old_str = old_path.to_string_lossy();
    let new_str = new_path.to_string_lossy();
    run_git(store, &["worktree", "move", "--", &old_str, &new_str])?;
    Ok(())
}

/// List the store's checkouts as recorded by git.
pub fn list_checkouts(ctx: &StoreContext) -> GitResult<Vec<CheckoutEntry>> {
    let store = ctx.bare_repo.as_path();
    let output = run_git_stdout(store, &["worktree", "list", "--porcelain"])?;

    let mut entries = Vec::new();
    let mut current: Option<CheckoutEntry> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(CheckoutEntry {
                path: PathBuf::from(path),
                head: None,
                branch: None,
            });
        } else if let Some(entry) = current.as_mut() {
            if let Some(sha) = line.strip_prefix("HEAD ") {
                entry.head = Sha::parse(sha).ok();
            } else if let Some(branch_ref) = line.strip_prefix("branch ") {
                entry.branch = Some(
                    branch_ref
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch_ref)
                        .to_string(),
                );
            }
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    Ok(entries)
}

/// Rebase the checkout's current branch onto a refreshed base ref.
///
/// A conflict surfaces as [`GitError::RebaseConflict`] and the working tree
/// is left in the conflicted rebase state for the user to resolve.
pub fn rebase_onto(ctx: &StoreContext, path: &Path, base_ref: &str) -> GitResult<()> {
    let output = git_commit_command(path, &ctx.identity)
        .args(["rebase", base_ref])
        .output()?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stderr.contains("CONFLICT")
        || stdout.contains("CONFLICT")
        || stderr.contains("could not apply")
    {
        Err(GitError::RebaseConflict { details: stderr })
    } else {
        Err(GitError::CommandFailed {
            command: format!("git rebase {}", base_ref),
            stderr,
        })
    }
}

/// Bootstrap a checkout when the shared store has no commits yet.
///
/// The checkout is initialized as a standalone repository pointed at the
/// same remote, fast-forwarded from any remote ref that can be fetched; when
/// nothing is fetchable a single empty commit makes the checkout usable.
fn bootstrap_orphan(ctx: &StoreContext, path: &Path, branch: &str) -> GitResult<()> {
    std::fs::create_dir_all(path)?;
    run_git(path, &["init", "--initial-branch", branch])?;
    run_git(path, &["remote", "add", "origin", &ctx.remote_url])?;

    let fetched = with_retry("bootstrap fetch", ctx.retry, || fetch(path, &[]));
    if let Err(e) = &fetched {
        tracing::warn!(error = %e, "bootstrap fetch failed, store remote has no reachable refs");
    }

    let first_remote_ref = run_git_stdout(
        path,
        &[
            "for-each-ref",
            "--count=1",
            "--format=%(refname:short)",
            "refs/remotes/origin",
        ],
    )
    .ok()
    .filter(|s| !s.is_empty());

    if let Some(remote_ref) = first_remote_ref {
        run_git(path, &["reset", "--hard", &remote_ref])?;
    } else {
        let output = git_commit_command(path, &ctx.identity)
            .args(["commit", "--allow-empty", "-m", "initial commit"])
            .output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: "git commit --allow-empty".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
    }

    Ok(())
}

/// Ensure the checkout's `origin` remote matches the store's canonical URL.
fn sync_remote_config(ctx: &StoreContext, path: &Path) -> GitResult<()> {
    match remote_url(path) {
        None => {
            run_git(path, &["remote", "add", "origin", &ctx.remote_url])?;
        }
        Some(url) if url != ctx.remote_url => {
            run_git(path, &["remote", "set-url", "origin", &ctx.remote_url])?;
        }
        Some(_) => {}
    }
    Ok(())
}

/// Keep a local copy of the default branch around for later rebases.
///
/// Only created when the remote-tracking ref exists and no local copy does;
/// checkouts of the default branch itself never need it.
fn ensure_local_default_branch(ctx: &StoreContext, path: &Path) -> GitResult<()> {
    let default = ctx.default_branch.as_str();
    if super::current_branch(path)?.as_deref() == Some(default) {
        return Ok(());
    }
    if !local_branch_exists(path, default) && remote_branch_exists(path, default) {
        run_git(
            path,
            &["branch", "--track", default, &format!("origin/{}", default)],
        )?;
    }
    Ok(())
}
