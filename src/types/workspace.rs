//! The workspace record and its lifecycle mode.
//!
//! `WorkspaceMode` is a closed enum whose variants carry the state that is
//! only meaningful in that mode. A `Claimed` or `Pooled` workspace has no
//! branch field at all: its checkout is pinned to a commit in detached HEAD
//! state and only a tracking branch is recorded, so the mode/branch
//! agreement invariant holds by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ids::{Sha, WorkspaceId};

/// Lifecycle mode of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WorkspaceMode {
    /// Freshly branched: the checkout is on a real, named branch.
    Branched {
        /// The checked-out branch name.
        branch: String,
    },

    /// Claimed from the pool: detached HEAD, pinned to a commit of the
    /// tracking branch.
    Claimed {
        /// The branch the detached commit was resolved from.
        tracking_branch: String,
        /// When the workspace was claimed.
        claimed_at: DateTime<Utc>,
        /// The commit the checkout was pinned to at claim time.
        base_sha: Sha,
    },

    /// Returned to the pool: detached HEAD, idle, available for reuse.
    Pooled {
        /// The branch the detached commit was last resolved from.
        tracking_branch: String,
        /// The commit the checkout was pinned to at release time.
        base_sha: Sha,
    },
}

impl WorkspaceMode {
    /// Short mode label for logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            WorkspaceMode::Branched { .. } => "branched",
            WorkspaceMode::Claimed { .. } => "claimed",
            WorkspaceMode::Pooled { .. } => "pooled",
        }
    }
}

/// Snapshot of a checkout's working-tree cleanliness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkingTreeStatus {
    /// True when there are no staged, unstaged, untracked, or conflicted entries.
    pub clean: bool,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
    pub conflicted: u32,
}

impl WorkingTreeStatus {
    /// A status representing a pristine working tree.
    pub fn pristine() -> Self {
        WorkingTreeStatus {
            clean: true,
            ..Default::default()
        }
    }
}

/// One lightweight checkout of a project's shared object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Derived id: `<project>/<name>`.
    pub id: WorkspaceId,

    /// Owning project name.
    pub project: String,

    /// Workspace name (last path segment of `path`).
    pub name: String,

    /// Filesystem path of the checkout. Unique within the project's
    /// workspace root.
    pub path: PathBuf,

    /// The branch this workspace's work is measured against.
    pub base_branch: String,

    pub created_at: DateTime<Utc>,

    /// Updated on every successful lifecycle operation; drives claim FIFO
    /// ordering and pool-overflow eviction.
    pub last_used_at: DateTime<Utc>,

    pub status: WorkingTreeStatus,

    /// Commits ahead of the base branch, when last computed.
    #[serde(default)]
    pub ahead: Option<u32>,

    /// Commits behind the base branch, when last computed.
    #[serde(default)]
    pub behind: Option<u32>,

    /// Free-text description, set by the command layer.
    #[serde(default)]
    pub description: Option<String>,

    #[serde(flatten)]
    pub mode: WorkspaceMode,
}

impl Workspace {
    /// The checked-out branch name, or `None` when the checkout is in
    /// detached HEAD state (claimed/pooled modes).
    pub fn branch_name(&self) -> Option<&str> {
        match &self.mode {
            WorkspaceMode::Branched { branch } => Some(branch),
            WorkspaceMode::Claimed { .. } | WorkspaceMode::Pooled { .. } => None,
        }
    }

    /// The tracking branch, set only for claimed/pooled workspaces.
    pub fn tracking_branch(&self) -> Option<&str> {
        match &self.mode {
            WorkspaceMode::Branched { .. } => None,
            WorkspaceMode::Claimed {
                tracking_branch, ..
            }
            | WorkspaceMode::Pooled {
                tracking_branch, ..
            } => Some(tracking_branch),
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.mode, WorkspaceMode::Pooled { .. })
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self.mode, WorkspaceMode::Claimed { .. })
    }

    pub fn is_branched(&self) -> bool {
        matches!(self.mode, WorkspaceMode::Branched { .. })
    }

    /// Bumps `last_used_at` to now.
    pub fn touch(&mut self) {
        self.last_used_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha() -> Sha {
        Sha::parse("0123456789abcdef0123456789abcdef01234567").unwrap()
    }

    fn workspace(mode: WorkspaceMode) -> Workspace {
        Workspace {
            id: WorkspaceId::derive("api", "wksp-1"),
            project: "api".to_string(),
            name: "wksp-1".to_string(),
            path: PathBuf::from("/work/api/wksp-1"),
            base_branch: "main".to_string(),
            created_at: Utc::now(),
            last_used_at: Utc::now(),
            status: WorkingTreeStatus::pristine(),
            ahead: None,
            behind: None,
            description: None,
            mode,
        }
    }

    #[test]
    fn branched_has_branch_and_no_tracking() {
        let ws = workspace(WorkspaceMode::Branched {
            branch: "feature/x".to_string(),
        });
        assert_eq!(ws.branch_name(), Some("feature/x"));
        assert_eq!(ws.tracking_branch(), None);
        assert!(ws.is_branched());
    }

    #[test]
    fn pooled_has_tracking_and_no_branch() {
        let ws = workspace(WorkspaceMode::Pooled {
            tracking_branch: "main".to_string(),
            base_sha: sha(),
        });
        assert_eq!(ws.branch_name(), None);
        assert_eq!(ws.tracking_branch(), Some("main"));
        assert!(ws.is_pooled());
    }

    #[test]
    fn mode_serializes_with_tag() {
        let ws = workspace(WorkspaceMode::Claimed {
            tracking_branch: "main".to_string(),
            claimed_at: Utc::now(),
            base_sha: sha(),
        });
        let json = serde_json::to_value(&ws).unwrap();
        assert_eq!(json["mode"], "claimed");
        assert_eq!(json["tracking_branch"], "main");
        // Branch-only fields must not leak into detached modes.
        assert!(json.get("branch").is_none());
    }

    #[test]
    fn workspace_round_trips() {
        let ws = workspace(WorkspaceMode::Branched {
            branch: "feature/x".to_string(),
        });
        let json = serde_json::to_string(&ws).unwrap();
        let back: Workspace = serde_json::from_str(&json).unwrap();
        assert_eq!(ws, back);
    }
}
