//! Working-tree status snapshots and ahead/behind counts.

use std::path::Path;

use crate::types::WorkingTreeStatus;

use super::{GitResult, ref_exists, run_git, run_git_stdout};

/// Capture the checkout's working-tree status from `git status --porcelain`.
pub fn working_tree_status(path: &Path) -> GitResult<WorkingTreeStatus> {
    // Porcelain lines are positional (" M foo" vs "M  foo"), so the raw
    // stdout must not be trimmed before parsing.
    let output = run_git(path, &["status", "--porcelain"])?;
    let text = String::from_utf8_lossy(&output.stdout);

    let mut status = WorkingTreeStatus::default();
    for line in text.lines() {
        if line.len() < 2 {
            continue;
        }
        let mut chars = line.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');

        if x == '?' && y == '?' {
            status.untracked += 1;
            continue;
        }
        // Unmerged entries per porcelain v1: DD, AA, and any side being U.
        if x == 'U' || y == 'U' || (x == 'D' && y == 'D') || (x == 'A' && y == 'A') {
            status.conflicted += 1;
            continue;
        }
        if x != ' ' {
            status.staged += 1;
        }
        if y != ' ' {
            status.unstaged += 1;
        }
    }

    status.clean =
        status.staged == 0 && status.unstaged == 0 && status.untracked == 0 && status.conflicted == 0;
    Ok(status)
}

/// Commits ahead of and behind the base branch.
///
/// Measured against the remote-tracking ref when it exists, the local branch
/// otherwise.
pub fn ahead_behind(path: &Path, base_branch: &str) -> GitResult<(u32, u32)> {
    let remote_ref = format!("origin/{}", base_branch);
    let base = if ref_exists(path, &remote_ref) {
        remote_ref
    } else {
        base_branch.to_string()
    };

    let range = format!("{}...HEAD", base);
    let output = run_git_stdout(path, &["rev-list", "--left-right", "--count", &range])?;

    let mut parts = output.split_whitespace();
    let behind = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let ahead = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Ok((ahead, behind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::run_git;
    use crate::test_utils::{commit_file, init_workspace_repo};

    #[test]
    fn pristine_tree_is_clean() {
        let (dir, _) = init_workspace_repo();
        let status = working_tree_status(dir.path()).unwrap();
        assert!(status.clean);
        assert_eq!(status.untracked, 0);
    }

    #[test]
    fn counts_staged_unstaged_untracked() {
        let (dir, _) = init_workspace_repo();

        std::fs::write(dir.path().join("staged.txt"), "staged").unwrap();
        run_git(dir.path(), &["add", "staged.txt"]).unwrap();
        std::fs::write(dir.path().join("README.md"), "modified").unwrap();
        std::fs::write(dir.path().join("untracked.txt"), "untracked").unwrap();

        let status = working_tree_status(dir.path()).unwrap();
        assert!(!status.clean);
        assert_eq!(status.staged, 1);
        assert_eq!(status.unstaged, 1);
        assert_eq!(status.untracked, 1);
        assert_eq!(status.conflicted, 0);
    }

    #[test]
    fn ahead_counts_local_commits() {
        let (dir, _) = init_workspace_repo();
        run_git(dir.path(), &["checkout", "-b", "feature/x"]).unwrap();
        commit_file(dir.path(), "one.txt", "1");
        commit_file(dir.path(), "two.txt", "2");

        let (ahead, behind) = ahead_behind(dir.path(), "main").unwrap();
        assert_eq!((ahead, behind), (2, 0));
    }

    #[test]
    fn behind_counts_base_commits() {
        let (dir, _) = init_workspace_repo();
        run_git(dir.path(), &["checkout", "-b", "feature/x"]).unwrap();
        run_git(dir.path(), &["checkout", "main"]).unwrap();
        commit_file(dir.path(), "main-only.txt", "m");
        run_git(dir.path(), &["checkout", "feature/x"]).unwrap();

        let (ahead, behind) = ahead_behind(dir.path(), "main").unwrap();
        assert_eq!((ahead, behind), (0, 1));
    }
}
