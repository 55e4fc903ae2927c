//! Core domain types: identifiers, project and workspace records.

pub mod ids;
pub mod project;
pub mod workspace;

pub use ids::{Sha, WorkspaceId};
pub use project::Project;
pub use workspace::{WorkingTreeStatus, Workspace, WorkspaceMode};
