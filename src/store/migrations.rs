//! Schema versioning and forward migrations for the metadata document.
//!
//! Migrations run on the raw JSON value *before* typed deserialization, so a
//! document written by an older release is upgraded field-by-field and then
//! parsed exactly like a current one. Each migration stamps its target
//! version; a crash mid-chain leaves a document that simply resumes
//! migrating on the next load.

use serde_json::Value;

/// Current schema version. Increment when making breaking changes and add a
/// migration below.
pub const SCHEMA_VERSION: u32 = 3;

pub(crate) struct Migration {
    /// The version the document is at after this migration.
    pub target: u32,
    pub apply: fn(&mut Value),
}

/// All migrations, ordered by target version.
pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        target: 2,
        apply: add_last_cleanup_field,
    },
    Migration {
        target: 3,
        apply: add_workspace_description,
    },
];

/// Read the stored schema version; documents predating the version field are
/// treated as version 1.
pub(crate) fn stored_version(doc: &Value) -> u32 {
    doc.get("metadata")
        .and_then(|m| m.get("schema_version"))
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1)
}

/// Apply every pending migration in order, stamping the version after each.
pub(crate) fn migrate(doc: &mut Value) {
    let mut version = stored_version(doc);

    for migration in MIGRATIONS {
        if migration.target <= version {
            continue;
        }
        (migration.apply)(doc);
        version = migration.target;
        if let Some(metadata) = doc.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("schema_version".to_string(), Value::from(version));
        }
        tracing::info!(version, "migrated metadata document");
    }
}

/// v1 → v2: store-wide cleanup bookkeeping was added.
fn add_last_cleanup_field(doc: &mut Value) {
    if let Some(metadata) = doc.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata
            .entry("last_cleanup_at".to_string())
            .or_insert(Value::Null);
    }
}

/// v2 → v3: workspaces gained a free-text description.
fn add_workspace_description(doc: &mut Value) {
    if let Some(workspaces) = doc.get_mut("workspaces").and_then(Value::as_object_mut) {
        for workspace in workspaces.values_mut() {
            if let Some(record) = workspace.as_object_mut() {
                record
                    .entry("description".to_string())
                    .or_insert(Value::Null);
            }
        }
    }
}
