//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! workspace name where a full workspace id is expected) and make the code
//! more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A git commit SHA (40 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(String);

impl Sha {
    /// Parses a SHA, validating that it is exactly 40 lowercase hex characters.
    pub fn parse(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.len() == 40
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            Ok(Sha(s))
        } else {
            Err(s)
        }
    }

    /// Returns the SHA as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the SHA for display.
    pub fn short(&self) -> &str {
        // Use get() to avoid panic on malformed input smuggled in via Deserialize.
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A workspace identifier in `<project>/<workspace>` form.
///
/// The id is *derived*, not assigned: renaming a workspace produces a new id,
/// and the metadata store must be re-keyed (remove old, insert new).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Derives the id for a workspace within a project.
    pub fn derive(project: &str, workspace: &str) -> Self {
        WorkspaceId(format!("{}/{}", project, workspace))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The project-name component of the id.
    pub fn project(&self) -> &str {
        self.0.split_once('/').map(|(p, _)| p).unwrap_or(&self.0)
    }

    /// The workspace-name component of the id.
    pub fn workspace(&self) -> &str {
        self.0.split_once('/').map(|(_, w)| w).unwrap_or("")
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkspaceId {
    fn from(s: String) -> Self {
        WorkspaceId(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha_parse_accepts_lowercase_hex() {
        assert!(Sha::parse("a".repeat(40)).is_ok());
        assert!(Sha::parse("0123456789abcdef0123456789abcdef01234567").is_ok());
    }

    #[test]
    fn sha_parse_rejects_short_and_uppercase() {
        assert!(Sha::parse("abc123").is_err());
        assert!(Sha::parse("A".repeat(40)).is_err());
        assert!(Sha::parse("g".repeat(40)).is_err());
    }

    #[test]
    fn sha_short_is_seven_chars() {
        let sha = Sha::parse("0123456789abcdef0123456789abcdef01234567").unwrap();
        assert_eq!(sha.short(), "0123456");
    }

    #[test]
    fn workspace_id_components() {
        let id = WorkspaceId::derive("api", "feature-x");
        assert_eq!(id.as_str(), "api/feature-x");
        assert_eq!(id.project(), "api");
        assert_eq!(id.workspace(), "feature-x");
    }

    #[test]
    fn workspace_id_orders_lexicographically() {
        let a = WorkspaceId::derive("api", "a");
        let b = WorkspaceId::derive("api", "b");
        assert!(a < b);
    }
}
