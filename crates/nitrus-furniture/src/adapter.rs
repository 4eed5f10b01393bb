//! The furniture adapter: loading, key extraction, and comparison.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

use nitrus_core::db::{DatabaseBackend, SqlDialect, SqlRow, SqlValue};
use nitrus_core::error::{Error, Result};
use nitrus_core::reconcile::{Adapter, Mutator, Query};
use nitrus_core::storage::StorageBackend;

use crate::gamedata::{FurnitureData, GdItem, ItemKind};
use crate::profile::{LogicalColumn, ServerProfile};

/// Default sync worker count. High enough for throughput against a
/// hosted database without exhausting its connection pool (capped at
/// 100 on the supported back-ends).
const DEFAULT_SYNC_WORKERS: usize = 50;

/// Safety net on the classname-mapping wait. Storage extraction cannot
/// start before the catalog is parsed; if the gamedata load wedges
/// without failing, this bounds the hang.
const MAPPING_READY_TIMEOUT: Duration = Duration::from_secs(300);

/// A normalized database furniture row.
#[derive(Debug, Clone, Default)]
pub struct DbItem {
    /// Autoincrement row id.
    pub id: i64,
    /// Catalog ID; the reconciliation key.
    pub sprite_id: i64,
    /// Classname.
    pub item_name: String,
    /// Display name.
    pub public_name: String,
    /// Floor footprint width.
    pub width: i64,
    /// Floor footprint length.
    pub length: i64,
    /// Whether avatars can sit.
    pub can_sit: bool,
    /// Whether avatars can walk over.
    pub can_walk: bool,
    /// Whether avatars can lie down.
    pub can_lay: bool,
    /// Floor/wall discriminator letter.
    pub kind: String,
}

/// Everything mutations need: backends plus addressing configuration.
///
/// Report-only adapters don't carry one; the engine's mutation probe
/// then reports the capability as absent.
#[derive(Clone)]
pub struct MutationContext {
    /// Database backend, when the install has one.
    pub db: Option<Arc<dyn DatabaseBackend>>,
    /// Storage backend holding bundles and the catalog document.
    pub storage: Arc<dyn StorageBackend>,
    /// Prefix under which bundles live.
    pub storage_prefix: String,
    /// Bundle file extension.
    pub storage_extension: String,
    /// Emulator profile name.
    pub server_profile: String,
    /// Object key of the catalog document.
    pub gamedata_object: String,
    /// Sync batch worker count.
    pub sync_workers: usize,
}

impl MutationContext {
    /// Creates a mutation context.
    ///
    /// The sync worker count defaults per backend dialect: 50 for hosted
    /// databases, 1 for `SQLite` where concurrent writers only contend on
    /// the file lock.
    #[must_use]
    pub fn new(
        db: Option<Arc<dyn DatabaseBackend>>,
        storage: Arc<dyn StorageBackend>,
        storage_prefix: impl Into<String>,
        storage_extension: impl Into<String>,
        server_profile: impl Into<String>,
        gamedata_object: impl Into<String>,
    ) -> Self {
        let sync_workers = match db.as_ref().map(|db| db.dialect()) {
            Some(SqlDialect::Sqlite) => 1,
            _ => DEFAULT_SYNC_WORKERS,
        };
        Self {
            db,
            storage,
            storage_prefix: storage_prefix.into(),
            storage_extension: storage_extension.into(),
            server_profile: server_profile.into(),
            gamedata_object: gamedata_object.into(),
            sync_workers,
        }
    }

    /// Overrides the sync batch worker count.
    #[must_use]
    pub fn with_sync_workers(mut self, workers: usize) -> Self {
        self.sync_workers = workers.max(1);
        self
    }
}

impl std::fmt::Debug for MutationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationContext")
            .field("storage_prefix", &self.storage_prefix)
            .field("server_profile", &self.server_profile)
            .field("gamedata_object", &self.gamedata_object)
            .field("sync_workers", &self.sync_workers)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct ClassnameMaps {
    classname_to_id: HashMap<String, String>,
    id_to_classname: HashMap<String, String>,
}

/// The furniture [`Adapter`].
///
/// Storage filenames are classnames, but reconciliation keys are catalog
/// IDs, so storage extraction needs the classname↔ID maps that only the
/// gamedata load can produce. The adapter populates both maps under an
/// exclusive lock during [`Adapter::load_gamedata_index`], flips a
/// one-shot readiness signal, and has the storage load wait on it -
/// storage extraction therefore always observes fully-populated maps,
/// even though the engine runs the loads concurrently.
pub struct FurnitureAdapter {
    maps: RwLock<ClassnameMaps>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    /// Serializes catalog read-modify-write cycles during purges.
    pub(crate) catalog_lock: tokio::sync::Mutex<()>,
    pub(crate) mutation: Option<MutationContext>,
}

impl Default for FurnitureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FurnitureAdapter {
    /// Creates a report-only adapter (no mutation capability).
    #[must_use]
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            maps: RwLock::new(ClassnameMaps::default()),
            ready_tx,
            ready_rx,
            catalog_lock: tokio::sync::Mutex::new(()),
            mutation: None,
        }
    }

    /// Creates an adapter that can purge and sync.
    #[must_use]
    pub fn with_mutations(context: MutationContext) -> Self {
        let mut adapter = Self::new();
        adapter.mutation = Some(context);
        adapter
    }

    pub(crate) fn mutation_context(&self) -> Result<&MutationContext> {
        self.mutation
            .as_ref()
            .ok_or_else(|| Error::internal("mutation context not configured on this adapter"))
    }

    /// Blocks until the classname maps are populated.
    async fn wait_mapping_ready(&self) -> Result<()> {
        let mut ready = self.ready_rx.clone();
        tokio::time::timeout(MAPPING_READY_TIMEOUT, ready.wait_for(|ready| *ready))
            .await
            .map_err(|_| Error::Timeout("gamedata classname mapping".into()))?
            .map_err(|_| Error::internal("classname mapping signal dropped"))?;
        Ok(())
    }

    /// Classname for an entity key, when the catalog knows it.
    pub(crate) fn classname_for(&self, key: &str) -> Option<String> {
        self.maps
            .read()
            .ok()
            .and_then(|maps| maps.id_to_classname.get(key).cloned())
    }

    /// Canonical object key for an entity key: the mapped classname when
    /// one exists, otherwise the key itself as a relative path.
    pub(crate) fn object_key_for(&self, key: &str, prefix: &str, extension: &str) -> String {
        let stem = self.classname_for(key).unwrap_or_else(|| key.to_string());
        format!("{prefix}/{stem}{extension}")
    }

    fn project_row(row: &SqlRow, profile: &ServerProfile) -> DbItem {
        let value = |field: LogicalColumn| profile.column(field).and_then(|name| row.get(name));

        DbItem {
            id: value(LogicalColumn::Id).map_or(0, SqlValue::as_i64),
            sprite_id: value(LogicalColumn::SpriteId).map_or(0, SqlValue::as_i64),
            item_name: value(LogicalColumn::ItemName).map(SqlValue::as_string).unwrap_or_default(),
            public_name: value(LogicalColumn::PublicName)
                .map(SqlValue::as_string)
                .unwrap_or_default(),
            width: value(LogicalColumn::Width).map_or(0, SqlValue::as_i64),
            length: value(LogicalColumn::Length).map_or(0, SqlValue::as_i64),
            can_sit: value(LogicalColumn::CanSit).is_some_and(SqlValue::as_bool),
            can_walk: value(LogicalColumn::CanWalk).is_some_and(SqlValue::as_bool),
            can_lay: value(LogicalColumn::CanLay).is_some_and(SqlValue::as_bool),
            kind: value(LogicalColumn::Kind).map(SqlValue::as_string).unwrap_or_default(),
        }
    }

    async fn query_one(
        db: &dyn DatabaseBackend,
        profile: &ServerProfile,
        column: &str,
        value: SqlValue,
    ) -> Result<Option<DbItem>> {
        let rows = db
            .query(
                &format!(
                    "SELECT * FROM {} WHERE {} = ? LIMIT 1",
                    profile.table, column
                ),
                vec![value],
            )
            .await?;
        Ok(rows.first().map(|row| Self::project_row(row, profile)))
    }
}

#[async_trait]
impl Adapter for FurnitureAdapter {
    type Db = DbItem;
    type Gd = GdItem;

    fn name(&self) -> &'static str {
        "furniture"
    }

    async fn load_db_index(
        &self,
        db: Option<&dyn DatabaseBackend>,
        server_profile: &str,
    ) -> Result<HashMap<String, DbItem>> {
        let mut index = HashMap::new();
        let Some(db) = db else {
            return Ok(index);
        };

        let profile = ServerProfile::by_name(server_profile);
        let rows = db
            .query(&format!("SELECT * FROM {}", profile.table), vec![])
            .await?;

        for row in &rows {
            let item = Self::project_row(row, &profile);
            // Keyed by sprite_id: it matches the catalog ID, the row id
            // does not.
            index.insert(item.sprite_id.to_string(), item);
        }

        tracing::debug!(rows = index.len(), table = profile.table, "loaded db index");
        Ok(index)
    }

    async fn load_gamedata_index(
        &self,
        storage: &dyn StorageBackend,
        object: &str,
        _paths: &[String],
    ) -> Result<HashMap<String, GdItem>> {
        let data = storage.get(object).await?;
        let doc = FurnitureData::parse(&data)?;

        let mut index = HashMap::new();
        {
            let mut maps = self.maps.write().map_err(|_| Error::Internal {
                message: "classname map lock poisoned".into(),
            })?;
            maps.classname_to_id.clear();
            maps.id_to_classname.clear();

            let sections = [
                (&doc.roomitemtypes, ItemKind::Floor),
                (&doc.wallitemtypes, ItemKind::Wall),
            ];
            for (section, kind) in sections {
                for item in &section.furnitype {
                    if item.id <= 0 || item.classname.is_empty() {
                        continue;
                    }
                    let mut item = item.clone();
                    item.kind = kind;
                    let key = item.id.to_string();

                    if let Some(previous) = maps
                        .classname_to_id
                        .insert(item.classname.clone(), key.clone())
                    {
                        if previous != key {
                            tracing::warn!(
                                classname = %item.classname,
                                previous_id = %previous,
                                id = %key,
                                "classname claimed by multiple ids, keeping the newest"
                            );
                        }
                    }
                    maps.id_to_classname.insert(key.clone(), item.classname.clone());
                    index.insert(key, item);
                }
            }

            // Flip the readiness signal while still holding the write
            // lock: storage extraction that wakes on it observes the
            // finished maps.
            self.ready_tx.send_replace(true);
        }

        tracing::debug!(items = index.len(), object, "loaded gamedata index");
        Ok(index)
    }

    async fn load_storage_set(
        &self,
        storage: &dyn StorageBackend,
        prefix: &str,
        extension: &str,
    ) -> Result<HashSet<String>> {
        // Key extraction needs the classname maps.
        self.wait_mapping_ready().await?;

        let objects = storage.list(prefix).await?;
        let mut set = HashSet::new();
        for meta in objects {
            if let Some(key) = self.storage_key(&meta.path, prefix, extension) {
                set.insert(key);
            }
        }

        tracing::debug!(objects = set.len(), prefix, "loaded storage set");
        Ok(set)
    }

    fn db_key(&self, item: &DbItem) -> String {
        item.sprite_id.to_string()
    }

    fn gd_key(&self, item: &GdItem) -> String {
        item.id.to_string()
    }

    fn storage_key(&self, object_key: &str, prefix: &str, extension: &str) -> Option<String> {
        if !object_key.ends_with(extension) {
            return None;
        }
        if !object_key.starts_with(prefix) {
            return None;
        }

        let rel = object_key[prefix.len()..].trim_start_matches('/');
        let rel_no_ext = rel.strip_suffix(extension)?;
        if rel_no_ext.is_empty() {
            return None;
        }

        // A bare basename whose stem is the canonical classname for its
        // ID keys as that ID. Anything else - nested path, unmapped or
        // shadowed basename - keys as its relative path, so delete
        // actions can reconstruct the original object name.
        if !rel_no_ext.contains('/') {
            if let Ok(maps) = self.maps.read() {
                if let Some(id) = maps.classname_to_id.get(rel_no_ext) {
                    if maps
                        .id_to_classname
                        .get(id)
                        .is_some_and(|canonical| canonical == rel_no_ext)
                    {
                        return Some(id.clone());
                    }
                }
            }
        }

        Some(rel_no_ext.to_string())
    }

    fn resolve_name(&self, db_item: Option<&DbItem>, gd_item: Option<&GdItem>) -> String {
        if let Some(db) = db_item {
            return db.public_name.clone();
        }
        if let Some(gd) = gd_item {
            return gd.name.clone();
        }
        String::new()
    }

    fn metadata(
        &self,
        db_item: Option<&DbItem>,
        gd_item: Option<&GdItem>,
    ) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();

        let classname = gd_item
            .map(|gd| gd.classname.clone())
            .filter(|c| !c.is_empty())
            .or_else(|| db_item.map(|db| db.item_name.clone()))
            .filter(|c| !c.is_empty());

        if let Some(classname) = classname {
            meta.insert("classname".to_string(), classname);
        }
        meta
    }

    fn compare_fields(&self, db: &DbItem, gd: &GdItem) -> Vec<String> {
        let mut mismatches = Vec::new();

        // Relaxed name check: a public name equal to the classname is the
        // emulator default for items whose display name was never set.
        if db.public_name != gd.name && db.public_name != gd.classname {
            mismatches.push(format!("name: gd='{}' db='{}'", gd.name, db.public_name));
        }

        if db.item_name != gd.classname {
            mismatches.push(format!(
                "classname: gd='{}' db='{}'",
                gd.classname, db.item_name
            ));
        }

        if db.width != gd.xdim {
            mismatches.push(format!("width: gd={} db={}", gd.xdim, db.width));
        }
        if db.length != gd.ydim {
            mismatches.push(format!("length: gd={} db={}", gd.ydim, db.length));
        }

        if db.can_sit != gd.cansiton {
            mismatches.push(format!("can_sit: gd={} db={}", gd.cansiton, db.can_sit));
        }
        if db.can_walk != gd.canstandon {
            mismatches.push(format!("can_walk: gd={} db={}", gd.canstandon, db.can_walk));
        }
        if db.can_lay != gd.canlayon {
            mismatches.push(format!("can_lay: gd={} db={}", gd.canlayon, db.can_lay));
        }

        // Asymmetric type rule: 'i' is exclusively wall, but floor items
        // sub-classify under several letters (s, e, r), so only the wall
        // bit is comparable.
        if db.kind == "i" {
            if !gd.kind.is_wall() {
                mismatches.push("type: gd='room' (not wall) db='i' (wall)".to_string());
            }
        } else if gd.kind.is_wall() {
            mismatches.push(format!("type: gd='wall' db='{}' (not wall)", db.kind));
        }

        mismatches
    }

    async fn query_db(
        &self,
        db: Option<&dyn DatabaseBackend>,
        server_profile: &str,
        query: &Query,
    ) -> Result<Option<DbItem>> {
        let Some(db) = db else {
            return Ok(None);
        };
        let profile = ServerProfile::by_name(server_profile);

        if let Some(id) = query.id.as_ref().and_then(|id| id.parse::<i64>().ok()) {
            if let Some(column) = profile.column(LogicalColumn::Id) {
                if let Some(item) =
                    Self::query_one(db, &profile, column, SqlValue::Integer(id)).await?
                {
                    return Ok(Some(item));
                }
            }
        }

        if let Some(classname) = query.classname.as_ref().filter(|c| !c.is_empty()) {
            if let Some(column) = profile.column(LogicalColumn::ItemName) {
                if let Some(item) =
                    Self::query_one(db, &profile, column, SqlValue::from(classname.clone())).await?
                {
                    return Ok(Some(item));
                }
            }
        }

        if let Some(name) = query.name.as_ref().filter(|n| !n.is_empty()) {
            if let Some(column) = profile.column(LogicalColumn::PublicName) {
                if let Some(item) =
                    Self::query_one(db, &profile, column, SqlValue::from(name.clone())).await?
                {
                    return Ok(Some(item));
                }
            }
        }

        Ok(None)
    }

    async fn query_gamedata(
        &self,
        storage: &dyn StorageBackend,
        object: &str,
        paths: &[String],
        query: &Query,
    ) -> Result<Option<GdItem>> {
        // The document has no index; a targeted lookup still parses it
        // whole. Cached indices are the fast path for repeated queries.
        let index = self.load_gamedata_index(storage, object, paths).await?;

        if let Some(id) = &query.id {
            if let Some(item) = index.get(id) {
                return Ok(Some(item.clone()));
            }
        }

        for item in index.values() {
            if let Some(classname) = query.classname.as_ref().filter(|c| !c.is_empty()) {
                if &item.classname == classname {
                    return Ok(Some(item.clone()));
                }
            }
            if let Some(name) = query.name.as_ref().filter(|n| !n.is_empty()) {
                if &item.name == name {
                    return Ok(Some(item.clone()));
                }
            }
        }

        Ok(None)
    }

    async fn check_storage(
        &self,
        storage: &dyn StorageBackend,
        prefix: &str,
        extension: &str,
        key: &str,
    ) -> Result<bool> {
        let object_key = self.object_key_for(key, prefix, extension);
        storage.exists(&object_key).await
    }

    async fn prepare(&self, db: &dyn DatabaseBackend, server_profile: &str) -> Result<()> {
        crate::prepare::widen_name_columns(db, &ServerProfile::by_name(server_profile)).await
    }

    fn mutator(&self) -> Option<&dyn Mutator<Gd = GdItem>> {
        self.mutation
            .as_ref()
            .map(|_| self as &dyn Mutator<Gd = GdItem>)
    }
}
