//! The adapter contract between the engine and a concrete asset model.
//!
//! Each adapter teaches the engine how to load, index, and compare one
//! asset model (furniture today; effects or clothing would be further
//! implementations). Mutation is optional: the engine probes for the
//! [`Mutator`] capability at apply time, and mutators in turn may offer
//! the [`BatchMutator`] fast paths.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::db::DatabaseBackend;
use crate::error::Result;
use crate::storage::StorageBackend;

use super::types::{Action, Query};

/// Model-specific reconciliation logic.
///
/// Load implementations should batch: one query for the database, one
/// document fetch for gamedata, one listing pass for storage.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Normalized database item type.
    type Db: Clone + Send + Sync + 'static;

    /// Gamedata catalog item type.
    type Gd: Clone + Send + Sync + 'static;

    /// Unique name of this adapter (e.g. `furniture`). Used in cache
    /// keys and diagnostics.
    fn name(&self) -> &'static str;

    /// Loads all relevant database rows, indexed by entity key.
    ///
    /// An absent database yields an empty index, never an error.
    async fn load_db_index(
        &self,
        db: Option<&dyn DatabaseBackend>,
        server_profile: &str,
    ) -> Result<HashMap<String, Self::Db>>;

    /// Fetches and parses the gamedata document, returning items indexed
    /// by entity key. `paths` names the JSON arrays to merge.
    async fn load_gamedata_index(
        &self,
        storage: &dyn StorageBackend,
        object: &str,
        paths: &[String],
    ) -> Result<HashMap<String, Self::Gd>>;

    /// Lists storage objects under `prefix`, filtered by `extension`,
    /// and projects each through [`Adapter::storage_key`].
    async fn load_storage_set(
        &self,
        storage: &dyn StorageBackend,
        prefix: &str,
        extension: &str,
    ) -> Result<HashSet<String>>;

    /// Entity key of a database item.
    fn db_key(&self, item: &Self::Db) -> String;

    /// Entity key of a gamedata item.
    fn gd_key(&self, item: &Self::Gd) -> String;

    /// Projects a storage object key to an entity key, or `None` when
    /// the object doesn't belong to this model (wrong extension or
    /// outside the prefix).
    fn storage_key(&self, object_key: &str, prefix: &str, extension: &str) -> Option<String>;

    /// Display name for an entity given whichever items are present.
    fn resolve_name(&self, db_item: Option<&Self::Db>, gd_item: Option<&Self::Gd>) -> String;

    /// Model-specific adjuncts (e.g. classname) carried into results.
    fn metadata(
        &self,
        db_item: Option<&Self::Db>,
        gd_item: Option<&Self::Gd>,
    ) -> BTreeMap<String, String>;

    /// Compares mapped fields and returns one description per
    /// disagreement, each naming the field and both values.
    fn compare_fields(&self, db_item: &Self::Db, gd_item: &Self::Gd) -> Vec<String>;

    /// Targeted database lookup. `None` means no match, not an error.
    async fn query_db(
        &self,
        db: Option<&dyn DatabaseBackend>,
        server_profile: &str,
        query: &Query,
    ) -> Result<Option<Self::Db>>;

    /// Targeted gamedata lookup. May still parse the full document;
    /// cached indices are preferred for repeated queries.
    async fn query_gamedata(
        &self,
        storage: &dyn StorageBackend,
        object: &str,
        paths: &[String],
        query: &Query,
    ) -> Result<Option<Self::Gd>>;

    /// Checks whether one entity's storage object exists, without
    /// listing the whole prefix.
    async fn check_storage(
        &self,
        storage: &dyn StorageBackend,
        prefix: &str,
        extension: &str,
        key: &str,
    ) -> Result<bool>;

    /// One-shot idempotent schema preparation (e.g. column widening)
    /// before a sync-bearing run.
    async fn prepare(&self, db: &dyn DatabaseBackend, server_profile: &str) -> Result<()>;

    /// The mutation capability, when this adapter supports repairs.
    fn mutator(&self) -> Option<&dyn Mutator<Gd = Self::Gd>> {
        None
    }
}

/// Optional mutation capability: purge and sync primitives.
///
/// All keys are canonical entity keys as produced by the extract
/// operations of the owning [`Adapter`].
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Gamedata item type, matching the owning adapter's.
    type Gd: Clone + Send + Sync + 'static;

    /// Deletes the entity's database row.
    async fn delete_db(&self, key: &str) -> Result<()>;

    /// Removes the entity from the gamedata document and rewrites it.
    async fn delete_gamedata(&self, key: &str) -> Result<()>;

    /// Deletes the entity's storage object.
    async fn delete_storage(&self, key: &str) -> Result<()>;

    /// Updates database fields from the gamedata entity. Zero updated
    /// rows is an error, not a no-op.
    async fn sync_db_from_gamedata(&self, key: &str, gd_item: &Self::Gd) -> Result<()>;

    /// The batch fast paths, when offered.
    fn batch(&self) -> Option<&dyn BatchMutator<Gd = Self::Gd>> {
        None
    }
}

/// Batched mutation fast paths.
///
/// The engine groups a plan's actions by kind and hands each group to
/// the matching method here when the capability is present, falling back
/// to per-key [`Mutator`] calls otherwise.
#[async_trait]
pub trait BatchMutator: Send + Sync {
    /// Gamedata item type, matching the owning adapter's.
    type Gd: Clone + Send + Sync + 'static;

    /// Deletes many database rows in one statement.
    async fn delete_db_batch(&self, keys: &[String]) -> Result<()>;

    /// Removes many entities from the gamedata document in one
    /// read-modify-write cycle.
    async fn delete_gamedata_batch(&self, keys: &[String]) -> Result<()>;

    /// Deletes many storage objects through the backend's bulk
    /// primitive.
    async fn delete_storage_batch(&self, keys: &[String]) -> Result<()>;

    /// Applies many sync actions, typically through a worker pool.
    async fn sync_db_batch(&self, actions: &[Action<Self::Gd>]) -> Result<()>;
}
