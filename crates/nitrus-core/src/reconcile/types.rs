//! Shared value types for the reconcile pipeline.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// The reconciliation output for a single entity.
///
/// Contains presence flags for each source and any detected mismatches.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    /// Canonical key for the entity (decimal ID string, or a relative
    /// storage path for unmapped orphans).
    pub id: String,

    /// Display name, preferring the database's public name over the
    /// catalog's.
    pub name: String,

    /// Whether the entity exists in the database.
    pub db_present: bool,

    /// Whether the entity exists in storage.
    pub storage_present: bool,

    /// Whether the entity exists in the gamedata catalog.
    pub gamedata_present: bool,

    /// Field mismatch descriptions between database and gamedata, e.g.
    /// `width: gd=2 db=1`. Empty unless both sources carry the entity.
    pub mismatch: Vec<String>,

    /// Adapter-specific adjuncts (e.g. classname).
    pub metadata: BTreeMap<String, String>,
}

/// A search query for targeted reconciliation.
///
/// The adapter decides how to translate query fields into lookups.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Entity ID to search for.
    pub id: Option<String>,

    /// Display name to search for.
    pub name: Option<String>,

    /// Classname to search for.
    pub classname: Option<String>,
}

/// Options controlling planning and application of repairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Report without executing, even when confirmed.
    pub dry_run: bool,

    /// Plan deletion of entities missing from any store.
    pub do_purge: bool,

    /// Plan database updates from gamedata for mismatched entities.
    pub do_sync: bool,

    /// Explicit confirmation that destructive actions may run.
    pub confirmed: bool,
}

/// The kind of a planned action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Delete the database row.
    DeleteDb,
    /// Remove the entity from the gamedata catalog.
    DeleteGamedata,
    /// Delete the storage object.
    DeleteStorage,
    /// Update database fields from the gamedata entity.
    SyncDb,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DeleteDb => "delete_db",
            Self::DeleteGamedata => "delete_gamedata",
            Self::DeleteStorage => "delete_storage",
            Self::SyncDb => "sync_db",
        };
        f.write_str(name)
    }
}

/// One planned mutation.
#[derive(Debug, Clone, Serialize)]
pub struct Action<G> {
    /// What to do.
    #[serde(rename = "type")]
    pub kind: ActionKind,

    /// The canonical entity key the action targets.
    pub key: String,

    /// Human-readable justification, e.g. `missing in: [storage]`.
    pub reason: String,

    /// The gamedata entity carried by sync actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gd_item: Option<G>,
}

/// Aggregate counts over a plan.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PlanSummary {
    /// Total entities in the key union.
    pub total_items: usize,

    /// Entities known to database or gamedata but absent from storage.
    pub missing_storage: usize,

    /// Entities known to database or storage but absent from gamedata.
    pub missing_gamedata: usize,

    /// Entities known to gamedata or storage but absent from the database.
    pub missing_db: usize,

    /// Entities with at least one field mismatch.
    pub mismatches: usize,

    /// Planned delete actions.
    pub purge_actions: usize,

    /// Planned sync actions.
    pub sync_actions: usize,
}

/// A reconciliation plan: results, planned actions, and summary counts.
///
/// Plans are plain values; they outlive the cache record they were
/// derived from and can be carried between the plan and apply phases.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcilePlan<G> {
    /// Per-entity reconciliation results, sorted by key.
    pub results: Vec<ReconcileResult>,

    /// Planned actions, in execution order.
    pub actions: Vec<Action<G>>,

    /// Aggregate counts.
    pub summary: PlanSummary,
}

/// Configuration for a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileSpec {
    /// Time-to-live for cached indices. Zero disables caching.
    pub cache_ttl: Duration,

    /// Prefix under which storage objects live.
    pub storage_prefix: String,

    /// File extension filtering storage objects, e.g. `.nitro`.
    pub storage_extension: String,

    /// JSON paths to entity arrays inside the gamedata document.
    pub gamedata_paths: Vec<String>,

    /// Object key of the gamedata document, e.g.
    /// `gamedata/FurnitureData.json`.
    pub gamedata_object: String,

    /// Named emulator back-end, e.g. `arcturus`.
    pub server_profile: String,
}

impl ReconcileSpec {
    /// Returns the cache key for this spec under the given adapter.
    ///
    /// Every parameter that shapes an index is part of the key, so two
    /// specs differing in any of them never share a record.
    #[must_use]
    pub fn cache_key(&self, adapter_name: &str) -> String {
        let mut key = format!(
            "{adapter_name}|{}|{}|{}|{}",
            self.server_profile, self.storage_prefix, self.storage_extension, self.gamedata_object,
        );
        for path in &self.gamedata_paths {
            key.push('|');
            key.push_str(path);
        }
        key
    }
}
