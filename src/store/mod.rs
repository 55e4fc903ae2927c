//! Durable metadata: every project and workspace, in one JSON document.
//!
//! The document is the second source of truth next to the on-disk checkouts.
//! `load` upgrades older documents through the migration chain; `save`
//! writes atomically (write-to-temp, fsync, rename, directory fsync) so
//! readers only ever see a complete document. Cross-process exclusion is an
//! advisory lock held for one read-modify-write cycle; see [`lock`].

pub mod lock;
pub mod migrations;

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Project, Workspace, WorkspaceId};

pub use lock::StoreLock;
pub use migrations::SCHEMA_VERSION;

/// Version of the on-disk container format (not the record schema).
pub const FORMAT_VERSION: &str = "1";

/// Errors from metadata persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-wide bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub format_version: String,

    /// Record-schema version, advanced by migrations.
    pub schema_version: u32,

    /// When stale-workspace cleanup last ran.
    #[serde(default)]
    pub last_cleanup_at: Option<DateTime<Utc>>,

    /// The workspace the user is currently "in", if any. At most one.
    #[serde(default)]
    pub current_workspace: Option<WorkspaceId>,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        StoreMetadata {
            format_version: FORMAT_VERSION.to_string(),
            schema_version: SCHEMA_VERSION,
            last_cleanup_at: None,
            current_workspace: None,
        }
    }
}

/// The persisted container: all projects, all workspaces, store metadata.
///
/// Maps are `BTreeMap` so serialization order, and therefore the on-disk
/// bytes for an unchanged document, is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    pub projects: BTreeMap<String, Project>,
    pub workspaces: BTreeMap<WorkspaceId, Workspace>,
    pub metadata: StoreMetadata,
}

impl StoreDocument {
    /// Insert or replace a project record.
    pub fn upsert_project(&mut self, project: Project) {
        self.projects.insert(project.name.clone(), project);
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    /// Remove a project and cascade-delete its workspaces in the same
    /// mutation, so the workspace→project reference is never durably broken.
    pub fn remove_project(&mut self, name: &str) -> Option<Project> {
        let project = self.projects.remove(name)?;
        let ids: Vec<WorkspaceId> = self
            .workspaces
            .values()
            .filter(|ws| ws.project == name)
            .map(|ws| ws.id.clone())
            .collect();
        for id in ids {
            self.remove_workspace(&id);
        }
        Some(project)
    }

    /// Insert or replace a workspace record.
    pub fn upsert_workspace(&mut self, workspace: Workspace) {
        self.workspaces.insert(workspace.id.clone(), workspace);
    }

    pub fn workspace(&self, id: &WorkspaceId) -> Option<&Workspace> {
        self.workspaces.get(id)
    }

    pub fn workspace_mut(&mut self, id: &WorkspaceId) -> Option<&mut Workspace> {
        self.workspaces.get_mut(id)
    }

    /// Remove a workspace record, clearing the current pointer if it pointed
    /// here.
    pub fn remove_workspace(&mut self, id: &WorkspaceId) -> Option<Workspace> {
        let removed = self.workspaces.remove(id);
        if removed.is_some() && self.metadata.current_workspace.as_ref() == Some(id) {
            self.metadata.current_workspace = None;
        }
        removed
    }

    /// All workspaces belonging to a project.
    pub fn workspaces_for(&self, project: &str) -> Vec<&Workspace> {
        self.workspaces
            .values()
            .filter(|ws| ws.project == project)
            .collect()
    }

    /// Workspaces whose name or branch contains `query`, optionally scoped
    /// to one project.
    pub fn search(&self, query: &str, project: Option<&str>) -> Vec<&Workspace> {
        self.workspaces
            .values()
            .filter(|ws| project.is_none_or(|p| ws.project == p))
            .filter(|ws| {
                ws.name.contains(query)
                    || ws.branch_name().is_some_and(|b| b.contains(query))
                    || ws.tracking_branch().is_some_and(|b| b.contains(query))
            })
            .collect()
    }

    /// The current workspace, when the pointer is set and still valid.
    pub fn current_workspace(&self) -> Option<&Workspace> {
        self.metadata
            .current_workspace
            .as_ref()
            .and_then(|id| self.workspaces.get(id))
    }

    pub fn set_current_workspace(&mut self, id: Option<WorkspaceId>) {
        self.metadata.current_workspace = id;
    }

    /// Resolve the workspace containing a filesystem path (directory-based
    /// context detection). The deepest match wins.
    pub fn workspace_at_path(&self, path: &Path) -> Option<&Workspace> {
        self.workspaces
            .values()
            .filter(|ws| path.starts_with(&ws.path))
            .max_by_key(|ws| ws.path.as_os_str().len())
    }
}

/// Handle on the persisted metadata file.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MetadataStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the store's advisory lock for one read-modify-write cycle.
    pub fn locked(&self) -> StoreResult<StoreLock> {
        Ok(StoreLock::acquire(&self.path)?)
    }

    /// Load the document, creating an empty current-version one when the
    /// file does not exist yet.
    ///
    /// Older documents are upgraded through the migration chain. A document
    /// from a *newer* schema is loaded as-is with a compatibility warning;
    /// forward compatibility is not guaranteed.
    pub fn load(&self) -> StoreResult<StoreDocument> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(StoreDocument::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let stored = migrations::stored_version(&value);
        if stored < SCHEMA_VERSION {
            migrations::migrate(&mut value);
        } else if stored > SCHEMA_VERSION {
            tracing::warn!(
                stored,
                current = SCHEMA_VERSION,
                "metadata document written by a newer version; proceeding without migration"
            );
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Write the document back atomically.
    pub fn save(&self, document: &StoreDocument) -> StoreResult<()> {
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(document)?;

        {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            fsync_dir(parent)?;
        }

        Ok(())
    }
}

/// fsync a directory so a just-renamed file within it is durable.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    let file = File::open(dir)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sha, WorkingTreeStatus, WorkspaceMode};
    use serde_json::json;

    fn sha() -> Sha {
        Sha::parse("0123456789abcdef0123456789abcdef01234567").unwrap()
    }

    fn project(name: &str) -> Project {
        Project {
            name: name.to_string(),
            remote_url: format!("git@example.com:org/{}.git", name),
            bare_repo_path: PathBuf::from(format!("/stores/{}.git", name)),
            workspace_root: PathBuf::from(format!("/work/{}", name)),
            default_branch: "main".to_string(),
            created_at: Utc::now(),
            template: None,
        }
    }

    fn workspace(project: &str, name: &str, mode: WorkspaceMode) -> Workspace {
        Workspace {
            id: WorkspaceId::derive(project, name),
            project: project.to_string(),
            name: name.to_string(),
            path: PathBuf::from(format!("/work/{}/{}", project, name)),
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

    fn branched(project: &str, name: &str, branch: &str) -> Workspace {
        workspace(
            project,
            name,
            WorkspaceMode::Branched {
                branch: branch.to_string(),
            },
        )
    }

    #[test]
    fn load_missing_file_yields_empty_current_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("store.json"));

        let doc = store.load().unwrap();
        assert!(doc.projects.is_empty());
        assert!(doc.workspaces.is_empty());
        assert_eq!(doc.metadata.schema_version, SCHEMA_VERSION);
        assert_eq!(doc.metadata.format_version, FORMAT_VERSION);
    }

    #[test]
    fn save_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("store.json"));

        let mut doc = StoreDocument::default();
        doc.upsert_project(project("api"));
        doc.upsert_workspace(branched("api", "feature-x", "feature/x"));
        doc.upsert_workspace(workspace(
            "api",
            "wksp-1",
            WorkspaceMode::Pooled {
                tracking_branch: "main".to_string(),
                base_sha: sha(),
            },
        ));
        doc.set_current_workspace(Some(WorkspaceId::derive("api", "feature-x")));

        store.save(&doc).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(doc, loaded);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("store.json"));
        store.save(&StoreDocument::default()).unwrap();
        assert!(dir.path().join("store.json").exists());
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[test]
    fn load_migrates_v1_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let v1 = json!({
            "projects": {},
            "workspaces": {},
            "metadata": {"format_version": "1", "schema_version": 1}
        });
        std::fs::write(&path, serde_json::to_vec(&v1).unwrap()).unwrap();

        let doc = MetadataStore::new(&path).load().unwrap();
        assert_eq!(doc.metadata.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn load_keeps_newer_document_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let newer = json!({
            "projects": {},
            "workspaces": {},
            "metadata": {"format_version": "1", "schema_version": SCHEMA_VERSION + 1}
        });
        std::fs::write(&path, serde_json::to_vec(&newer).unwrap()).unwrap();

        let doc = MetadataStore::new(&path).load().unwrap();
        assert_eq!(doc.metadata.schema_version, SCHEMA_VERSION + 1);
    }

    #[test]
    fn remove_project_cascades_workspaces() {
        let mut doc = StoreDocument::default();
        doc.upsert_project(project("api"));
        doc.upsert_project(project("web"));
        doc.upsert_workspace(branched("api", "a", "feature/a"));
        doc.upsert_workspace(branched("web", "b", "feature/b"));
        doc.set_current_workspace(Some(WorkspaceId::derive("api", "a")));

        doc.remove_project("api");

        assert!(doc.project("api").is_none());
        assert!(doc.workspace(&WorkspaceId::derive("api", "a")).is_none());
        assert!(doc.workspace(&WorkspaceId::derive("web", "b")).is_some());
        // The pointer into the removed project must not dangle.
        assert!(doc.current_workspace().is_none());
    }

    #[test]
    fn search_matches_name_and_branch() {
        let mut doc = StoreDocument::default();
        doc.upsert_project(project("api"));
        doc.upsert_workspace(branched("api", "feature-login", "feature/login"));
        doc.upsert_workspace(branched("api", "other", "fix/rate-limit"));

        let by_name = doc.search("login", None);
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "feature-login");

        let by_branch = doc.search("rate", None);
        assert_eq!(by_branch.len(), 1);
        assert_eq!(by_branch[0].name, "other");

        assert!(doc.search("login", Some("web")).is_empty());
    }

    #[test]
    fn workspace_at_path_prefers_deepest_match() {
        let mut doc = StoreDocument::default();
        let mut outer = branched("api", "outer", "feature/outer");
        outer.path = PathBuf::from("/work/api");
        let mut inner = branched("api", "inner", "feature/inner");
        inner.path = PathBuf::from("/work/api/inner");
        doc.upsert_workspace(outer);
        doc.upsert_workspace(inner);

        let hit = doc
            .workspace_at_path(Path::new("/work/api/inner/src/lib.rs"))
            .unwrap();
        assert_eq!(hit.name, "inner");

        let outer_hit = doc.workspace_at_path(Path::new("/work/api/other")).unwrap();
        assert_eq!(outer_hit.name, "outer");

        assert!(doc.workspace_at_path(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn remove_workspace_clears_current_pointer() {
        let mut doc = StoreDocument::default();
        doc.upsert_project(project("api"));
        let ws = branched("api", "a", "feature/a");
        let id = ws.id.clone();
        doc.upsert_workspace(ws);
        doc.set_current_workspace(Some(id.clone()));

        doc.remove_workspace(&id);
        assert!(doc.current_workspace().is_none());
    }
}
