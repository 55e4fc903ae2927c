//! The project record: one managed repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One managed repository, backed by a shared bare object store under which
/// all of its workspaces are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project name (primary key in the metadata store).
    pub name: String,

    /// Canonical remote URL the bare store was cloned from.
    pub remote_url: String,

    /// Path to the shared bare object store.
    pub bare_repo_path: PathBuf,

    /// Root directory under which this project's workspaces live.
    pub workspace_root: PathBuf,

    /// Default branch name (e.g., "main").
    pub default_branch: String,

    /// When the project was registered.
    pub created_at: DateTime<Utc>,

    /// Optional template reference applied to new workspaces by the command
    /// layer. Opaque to the lifecycle engine.
    #[serde(default)]
    pub template: Option<String>,
}

impl Project {
    /// The filesystem path a workspace with the given name would occupy.
    pub fn workspace_path(&self, workspace_name: &str) -> PathBuf {
        self.workspace_root.join(workspace_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_path_joins_root() {
        let project = Project {
            name: "api".to_string(),
            remote_url: "git@example.com:org/api.git".to_string(),
            bare_repo_path: PathBuf::from("/stores/api.git"),
            workspace_root: PathBuf::from("/work/api"),
            default_branch: "main".to_string(),
            created_at: Utc::now(),
            template: None,
        };
        assert_eq!(
            project.workspace_path("feature-x"),
            PathBuf::from("/work/api/feature-x")
        );
    }
}
