//! The workspace lifecycle engine.
//!
//! Ties the checkout orchestrator, the merge heuristic, and the metadata
//! store into the create/claim/release/save/rename/remove operations. Every
//! operation runs under the store's advisory lock as one strictly sequential
//! chain: read the document, mutate the on-disk checkout state, then persist
//! the updated record. Checkout-affecting steps come before the metadata
//! write, so a crash mid-operation leaves at worst an untracked checkout,
//! never a durable record pointing at a checkout that was never created.

pub mod naming;

use std::path::PathBuf;

use chrono::Utc;
use thiserror::Error;

use crate::config::ProjectConfig;
use crate::git::retry::{RetryConfig, with_retry};
use crate::git::worktree::{self, StoreContext};
use crate::git::{self, CommitIdentity, GitError, merged, status};
use crate::store::{MetadataStore, StoreDocument, StoreError};
use crate::types::{Project, Workspace, WorkspaceId, WorkspaceMode, WorkingTreeStatus};

/// Errors surfaced by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("project '{0}' not found; register it before creating workspaces")]
    ProjectNotFound(String),

    #[error("project '{0}' already exists")]
    ProjectExists(String),

    #[error("workspace '{0}' not found; list workspaces to see what exists")]
    WorkspaceNotFound(WorkspaceId),

    #[error("workspace '{0}' already exists; pass overwrite to replace it")]
    WorkspaceExists(WorkspaceId),

    #[error("branch '{0}' already exists; switch to it or pick a different name")]
    BranchExists(String),

    #[error("working tree has uncommitted changes; commit or stash them, or use force")]
    DirtyWorkingTree,

    #[error("workspace is {actual}, operation requires {expected}")]
    WrongMode {
        expected: &'static str,
        actual: &'static str,
    },

    #[error(
        "branch '{branch}' does not appear merged into '{base}'; use force to remove it anyway"
    )]
    BranchNotMerged { branch: String, base: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// The lifecycle engine: one instance per metadata store.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    store: MetadataStore,
    identity: CommitIdentity,
    retry: RetryConfig,
}

impl Lifecycle {
    pub fn new(store: MetadataStore) -> Self {
        Lifecycle {
            store,
            identity: CommitIdentity::default(),
            retry: RetryConfig::DEFAULT,
        }
    }

    pub fn with_identity(mut self, identity: CommitIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    // ─── Project registry ───

    /// Register a project. Its bare store and workspace root are expected to
    /// exist (or be created by the caller) before workspaces are made.
    pub fn add_project(&self, project: Project) -> LifecycleResult<()> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        if doc.project(&project.name).is_some() {
            return Err(LifecycleError::ProjectExists(project.name));
        }
        doc.upsert_project(project);
        self.store.save(&doc)?;
        Ok(())
    }

    /// Remove a project, its workspace records, and (best-effort) their
    /// checkouts. Record removal proceeds even when a checkout cannot be
    /// deleted.
    pub fn remove_project(&self, name: &str) -> LifecycleResult<()> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        let project = Self::project_of(&doc, name)?;
        let ctx = self.store_ctx(&project);

        for workspace in doc.workspaces_for(name) {
            if let Err(e) = worktree::remove_checkout(&ctx, &workspace.path) {
                tracing::warn!(
                    workspace = %workspace.id,
                    error = %e,
                    "checkout removal failed, removing record anyway"
                );
            }
        }
        doc.remove_project(name);
        self.store.save(&doc)?;
        Ok(())
    }

    // ─── Lifecycle operations ───

    /// Create a `branched` workspace on a (possibly new) branch.
    ///
    /// With `overwrite`, an existing workspace under the same derived id is
    /// force-removed first. If anything fails after the checkout exists but
    /// before the record is durably saved, the checkout is rolled back so no
    /// orphaned directory survives without metadata.
    pub fn create(
        &self,
        project_name: &str,
        branch: &str,
        base_branch: Option<&str>,
        config: &ProjectConfig,
        overwrite: bool,
    ) -> LifecycleResult<Workspace> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        let project = Self::project_of(&doc, project_name)?;
        let ctx = self.store_ctx(&project);

        let name = config.naming.apply(branch);
        let id = WorkspaceId::derive(&project.name, &name);

        if let Some(existing) = doc.workspace(&id) {
            if !overwrite {
                return Err(LifecycleError::WorkspaceExists(id));
            }
            let previous_path = existing.path.clone();
            worktree::remove_checkout(&ctx, &previous_path)?;
            doc.remove_workspace(&id);
        }

        let path = project.workspace_path(&name);
        let base = base_branch
            .or(config.default_base_branch.as_deref())
            .unwrap_or(&project.default_branch)
            .to_string();

        worktree::create_named_checkout(&ctx, &path, branch, Some(&base))?;

        let result = (|| -> LifecycleResult<Workspace> {
            let tree_status = status::working_tree_status(&path)?;
            let (ahead, behind) = match status::ahead_behind(&path, &base) {
                Ok((a, b)) => (Some(a), Some(b)),
                Err(_) => (None, None),
            };

            let now = Utc::now();
            let workspace = Workspace {
                id: id.clone(),
                project: project.name.clone(),
                name: name.clone(),
                path: path.clone(),
                base_branch: base.clone(),
                created_at: now,
                last_used_at: now,
                status: tree_status,
                ahead,
                behind,
                description: None,
                mode: WorkspaceMode::Branched {
                    branch: branch.to_string(),
                },
            };
            doc.upsert_workspace(workspace.clone());
            doc.set_current_workspace(Some(id.clone()));
            self.store.save(&doc)?;
            Ok(workspace)
        })();

        match result {
            Ok(workspace) => {
                tracing::info!(workspace = %workspace.id, branch, "created workspace");
                Ok(workspace)
            }
            Err(e) => {
                // The checkout exists but its record never became durable.
                if let Err(cleanup) = worktree::remove_checkout(&ctx, &path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "rollback of failed create left a checkout behind"
                    );
                }
                Err(e)
            }
        }
    }

    /// Claim a workspace pinned to `tracking_branch` (the project default
    /// when unset): the oldest-idle pooled workspace when one exists, a
    /// freshly allocated one otherwise.
    pub fn claim(
        &self,
        project_name: &str,
        tracking_branch: Option<&str>,
        config: &ProjectConfig,
    ) -> LifecycleResult<Workspace> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        let project = Self::project_of(&doc, project_name)?;
        let ctx = self.store_ctx(&project);

        let tracking = tracking_branch
            .unwrap_or(&project.default_branch)
            .to_string();

        // FIFO reuse: the oldest-idle pooled workspace wins, spreading
        // filesystem wear and keeping the rest of the pool warmer.
        let oldest_pooled = doc
            .workspaces_for(&project.name)
            .into_iter()
            .filter(|ws| ws.is_pooled())
            .min_by_key(|ws| ws.last_used_at)
            .map(|ws| ws.id.clone());

        if let Some(id) = oldest_pooled {
            let mut workspace = Self::workspace_of(&doc, &id)?;
            let sha = worktree::reset_detached_checkout(&ctx, &workspace.path, &tracking)?;

            let now = Utc::now();
            workspace.mode = WorkspaceMode::Claimed {
                tracking_branch: tracking.clone(),
                claimed_at: now,
                base_sha: sha,
            };
            workspace.status = WorkingTreeStatus::pristine();
            workspace.ahead = None;
            workspace.behind = None;
            workspace.last_used_at = now;

            doc.upsert_workspace(workspace.clone());
            doc.set_current_workspace(Some(id.clone()));
            self.store.save(&doc)?;
            tracing::info!(workspace = %id, tracking = %tracking, "claimed pooled workspace");
            return Ok(workspace);
        }

        // Empty pool: allocate a fresh pool-style name. The suffix scans
        // every existing name regardless of mode; a name is reserved once
        // ever used.
        let names: Vec<String> = doc
            .workspaces_for(&project.name)
            .into_iter()
            .map(|ws| ws.name.clone())
            .collect();
        let index = naming::next_pool_index(names.iter().map(String::as_str));
        let prefix = (tracking != project.default_branch)
            .then(|| naming::pool_prefix(config.naming, &tracking));
        let name = naming::pool_name(prefix.as_deref(), index);

        let id = WorkspaceId::derive(&project.name, &name);
        let path = project.workspace_path(&name);
        let sha = worktree::create_detached_checkout(&ctx, &path, &tracking)?;

        let result = (|| -> LifecycleResult<Workspace> {
            let now = Utc::now();
            let workspace = Workspace {
                id: id.clone(),
                project: project.name.clone(),
                name: name.clone(),
                path: path.clone(),
                base_branch: tracking.clone(),
                created_at: now,
                last_used_at: now,
                status: WorkingTreeStatus::pristine(),
                ahead: None,
                behind: None,
                description: None,
                mode: WorkspaceMode::Claimed {
                    tracking_branch: tracking.clone(),
                    claimed_at: now,
                    base_sha: sha,
                },
            };
            doc.upsert_workspace(workspace.clone());
            doc.set_current_workspace(Some(id.clone()));
            self.store.save(&doc)?;
            Ok(workspace)
        })();

        match result {
            Ok(workspace) => {
                tracing::info!(workspace = %workspace.id, tracking = %tracking, "claimed fresh workspace");
                Ok(workspace)
            }
            Err(e) => {
                if let Err(cleanup) = worktree::remove_checkout(&ctx, &path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "rollback of failed claim left a checkout behind"
                    );
                }
                Err(e)
            }
        }
    }

    /// Return a claimed (or branched) workspace to the pool.
    ///
    /// Refuses a dirty working tree without `force`. After the record is
    /// persisted, pool overflow is enforced: oldest-idle pooled workspaces
    /// beyond the configured maximum are removed entirely.
    pub fn release(
        &self,
        id: &WorkspaceId,
        config: &ProjectConfig,
        force: bool,
    ) -> LifecycleResult<Workspace> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        let mut workspace = Self::workspace_of(&doc, id)?;
        let project = Self::project_of(&doc, &workspace.project)?;
        let ctx = self.store_ctx(&project);

        if workspace.is_pooled() {
            return Err(LifecycleError::WrongMode {
                expected: "claimed or branched",
                actual: "pooled",
            });
        }

        let tree_status = status::working_tree_status(&workspace.path)?;
        if !tree_status.clean && !force {
            return Err(LifecycleError::DirtyWorkingTree);
        }

        let tracking = workspace
            .tracking_branch()
            .unwrap_or(&project.default_branch)
            .to_string();
        let sha = worktree::reset_detached_checkout(&ctx, &workspace.path, &tracking)?;

        let now = Utc::now();
        workspace.mode = WorkspaceMode::Pooled {
            tracking_branch: tracking,
            base_sha: sha,
        };
        workspace.status = WorkingTreeStatus::pristine();
        workspace.ahead = None;
        workspace.behind = None;
        workspace.last_used_at = now;

        doc.upsert_workspace(workspace.clone());
        self.store.save(&doc)?;
        tracing::info!(workspace = %id, "released workspace to pool");

        self.enforce_pool_overflow(&mut doc, &project, &ctx, config)?;
        Ok(workspace)
    }

    /// Promote a claimed workspace's detached work onto a new named branch.
    ///
    /// One-way: the workspace becomes `branched` and can only return to the
    /// pool via [`Lifecycle::release`].
    pub fn save_as_branch(&self, id: &WorkspaceId, new_branch: &str) -> LifecycleResult<Workspace> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        let mut workspace = Self::workspace_of(&doc, id)?;
        let project = Self::project_of(&doc, &workspace.project)?;

        if !workspace.is_claimed() {
            return Err(LifecycleError::WrongMode {
                expected: "claimed",
                actual: workspace.mode.label(),
            });
        }
        if git::local_branch_exists(&project.bare_repo_path, new_branch) {
            return Err(LifecycleError::BranchExists(new_branch.to_string()));
        }

        worktree::promote_detached_to_branch(&workspace.path, new_branch)?;

        workspace.mode = WorkspaceMode::Branched {
            branch: new_branch.to_string(),
        };
        workspace.touch();
        if let Ok(tree_status) = status::working_tree_status(&workspace.path) {
            workspace.status = tree_status;
        }

        doc.upsert_workspace(workspace.clone());
        self.store.save(&doc)?;
        tracing::info!(workspace = %id, branch = new_branch, "saved workspace as branch");
        Ok(workspace)
    }

    /// Rename a branched workspace's branch (and directory), optionally
    /// rebasing its commits onto a refreshed base first.
    ///
    /// A rebase conflict is fatal and not retried: the working tree is left
    /// in the conflicted state deliberately, for the user to resolve. The
    /// workspace id is derived from the name, so the record is re-keyed.
    pub fn rename(
        &self,
        id: &WorkspaceId,
        new_branch: &str,
        rebase: bool,
        config: &ProjectConfig,
    ) -> LifecycleResult<Workspace> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        let mut workspace = Self::workspace_of(&doc, id)?;
        let project = Self::project_of(&doc, &workspace.project)?;
        let ctx = self.store_ctx(&project);

        let WorkspaceMode::Branched { branch: old_branch } = workspace.mode.clone() else {
            return Err(LifecycleError::WrongMode {
                expected: "branched",
                actual: workspace.mode.label(),
            });
        };
        if new_branch == old_branch || git::local_branch_exists(&project.bare_repo_path, new_branch)
        {
            return Err(LifecycleError::BranchExists(new_branch.to_string()));
        }

        if rebase {
            let base = workspace.base_branch.clone();
            with_retry("fetch base branch", self.retry, || {
                git::fetch(&workspace.path, &[&base])
            })?;
            let (ahead, _) = status::ahead_behind(&workspace.path, &base)?;
            if ahead > 0 {
                let base_ref = if git::remote_branch_exists(&workspace.path, &base) {
                    format!("origin/{}", base)
                } else {
                    base.clone()
                };
                worktree::rebase_onto(&ctx, &workspace.path, &base_ref)?;
            }
        }

        git::run_git(&workspace.path, &["branch", "-m", &old_branch, new_branch])?;

        let new_name = config.naming.apply(new_branch);
        let old_id = workspace.id.clone();
        if new_name != workspace.name {
            let new_path = project.workspace_path(&new_name);
            worktree::move_checkout(&ctx, &workspace.path, &new_path)?;
            workspace.path = new_path;
            workspace.name = new_name;
        }

        let was_current = doc.metadata.current_workspace.as_ref() == Some(&old_id);
        doc.remove_workspace(&old_id);

        workspace.id = WorkspaceId::derive(&project.name, &workspace.name);
        workspace.mode = WorkspaceMode::Branched {
            branch: new_branch.to_string(),
        };
        workspace.touch();
        if let Ok(tree_status) = status::working_tree_status(&workspace.path) {
            workspace.status = tree_status;
        }
        if let Ok((ahead, behind)) = status::ahead_behind(&workspace.path, &workspace.base_branch) {
            workspace.ahead = Some(ahead);
            workspace.behind = Some(behind);
        }

        doc.upsert_workspace(workspace.clone());
        if was_current {
            doc.set_current_workspace(Some(workspace.id.clone()));
        }
        self.store.save(&doc)?;
        tracing::info!(
            old = %old_id,
            new = %workspace.id,
            branch = new_branch,
            "renamed workspace"
        );
        Ok(workspace)
    }

    /// Remove a workspace: checkout first, then the metadata record.
    ///
    /// A `branched` workspace whose branch the merge heuristic cannot prove
    /// merged into its base is refused without `force`. Record removal
    /// always proceeds even when checkout removal fails, so the store never
    /// keeps a record for a workspace the user believes is gone; at worst
    /// an orphaned directory remains for a later listing to detect.
    pub fn remove(&self, id: &WorkspaceId, force: bool) -> LifecycleResult<()> {
        let _lock = self.store.locked()?;
        let mut doc = self.store.load()?;
        let workspace = Self::workspace_of(&doc, id)?;
        let project = Self::project_of(&doc, &workspace.project)?;
        let ctx = self.store_ctx(&project);

        if let WorkspaceMode::Branched { branch } = &workspace.mode
            && !force
            && !merged::is_branch_merged(&project.bare_repo_path, branch, &workspace.base_branch)
        {
            return Err(LifecycleError::BranchNotMerged {
                branch: branch.clone(),
                base: workspace.base_branch.clone(),
            });
        }

        if let Err(e) = worktree::remove_checkout(&ctx, &workspace.path) {
            tracing::warn!(
                workspace = %id,
                error = %e,
                "checkout removal failed, removing metadata record anyway"
            );
        }
        doc.remove_workspace(id);
        self.store.save(&doc)?;
        tracing::info!(workspace = %id, "removed workspace");
        Ok(())
    }

    // ─── Accessors ───

    pub fn workspace(&self, id: &WorkspaceId) -> LifecycleResult<Workspace> {
        let doc = self.store.load()?;
        Self::workspace_of(&doc, id)
    }

    pub fn list(&self, project: &str) -> LifecycleResult<Vec<Workspace>> {
        let doc = self.store.load()?;
        Ok(doc.workspaces_for(project).into_iter().cloned().collect())
    }

    pub fn search(&self, query: &str, project: Option<&str>) -> LifecycleResult<Vec<Workspace>> {
        let doc = self.store.load()?;
        Ok(doc.search(query, project).into_iter().cloned().collect())
    }

    pub fn current(&self) -> LifecycleResult<Option<Workspace>> {
        let doc = self.store.load()?;
        Ok(doc.current_workspace().cloned())
    }

    /// Pooled workspaces idle beyond the configured age, for cleanup listings.
    pub fn stale_pooled(
        &self,
        project: &str,
        config: &ProjectConfig,
    ) -> LifecycleResult<Vec<Workspace>> {
        let doc = self.store.load()?;
        let cutoff = Utc::now() - chrono::Duration::days(config.pool.max_age_days);
        Ok(doc
            .workspaces_for(project)
            .into_iter()
            .filter(|ws| ws.is_pooled() && ws.last_used_at < cutoff)
            .cloned()
            .collect())
    }

    /// Directories under the project's workspace root with no workspace
    /// record: the residue of partial failures, detectable for cleanup.
    pub fn orphaned_checkouts(&self, project: &str) -> LifecycleResult<Vec<PathBuf>> {
        let doc = self.store.load()?;
        let project = Self::project_of(&doc, project)?;

        let mut orphans = Vec::new();
        let entries = match std::fs::read_dir(&project.workspace_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(orphans),
            Err(e) => return Err(StoreError::Io(e).into()),
        };
        for entry in entries {
            let entry = entry.map_err(StoreError::Io)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let tracked = doc
                .workspaces_for(&project.name)
                .iter()
                .any(|ws| ws.path == path);
            if !tracked {
                orphans.push(path);
            }
        }
        orphans.sort();
        Ok(orphans)
    }

    // ─── Internals ───

    fn store_ctx(&self, project: &Project) -> StoreContext {
        StoreContext {
            bare_repo: project.bare_repo_path.clone(),
            remote_url: project.remote_url.clone(),
            default_branch: project.default_branch.clone(),
            identity: self.identity.clone(),
            retry: self.retry,
        }
    }

    fn project_of(doc: &StoreDocument, name: &str) -> LifecycleResult<Project> {
        doc.project(name)
            .cloned()
            .ok_or_else(|| LifecycleError::ProjectNotFound(name.to_string()))
    }

    fn workspace_of(doc: &StoreDocument, id: &WorkspaceId) -> LifecycleResult<Workspace> {
        doc.workspace(id)
            .cloned()
            .ok_or_else(|| LifecycleError::WorkspaceNotFound(id.clone()))
    }

    /// Evict oldest-idle pooled workspaces beyond the configured maximum.
    fn enforce_pool_overflow(
        &self,
        doc: &mut StoreDocument,
        project: &Project,
        ctx: &StoreContext,
        config: &ProjectConfig,
    ) -> LifecycleResult<()> {
        let mut pooled: Vec<(WorkspaceId, chrono::DateTime<Utc>, PathBuf)> = doc
            .workspaces_for(&project.name)
            .into_iter()
            .filter(|ws| ws.is_pooled())
            .map(|ws| (ws.id.clone(), ws.last_used_at, ws.path.clone()))
            .collect();

        if pooled.len() <= config.pool.max_size {
            return Ok(());
        }

        pooled.sort_by_key(|(_, last_used, _)| *last_used);
        let excess = pooled.len() - config.pool.max_size;
        for (id, _, path) in pooled.into_iter().take(excess) {
            tracing::info!(workspace = %id, "evicting pooled workspace over pool limit");
            if let Err(e) = worktree::remove_checkout(ctx, &path) {
                tracing::warn!(
                    workspace = %id,
                    error = %e,
                    "checkout removal failed, removing record anyway"
                );
            }
            doc.remove_workspace(&id);
        }
        self.store.save(doc)?;
        Ok(())
    }
}
