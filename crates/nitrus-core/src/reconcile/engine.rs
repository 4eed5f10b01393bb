//! The reconcile engine: full scans and targeted single-item lookups.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::DatabaseBackend;
use crate::error::Result;
use crate::storage::StorageBackend;

use super::adapter::Adapter;
use super::cache::{CacheRecord, CacheStore};
use super::types::{Query, ReconcileResult, ReconcileSpec};

/// Reconciliation engine bound to one adapter, one spec, and the two
/// backends.
///
/// The engine owns the index cache: callers that want repeated runs to
/// share records keep one engine alive and issue every run through it.
pub struct Engine<A: Adapter> {
    adapter: Arc<A>,
    spec: ReconcileSpec,
    db: Option<Arc<dyn DatabaseBackend>>,
    storage: Arc<dyn StorageBackend>,
    cache: CacheStore<A>,
}

impl<A: Adapter> Engine<A> {
    /// Creates an engine.
    ///
    /// `db` may be `None` for installs without a database; the DB index
    /// is then empty and every entity reports `db_present = false`.
    #[must_use]
    pub fn new(
        adapter: Arc<A>,
        spec: ReconcileSpec,
        db: Option<Arc<dyn DatabaseBackend>>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            adapter,
            spec,
            db,
            storage,
            cache: CacheStore::new(),
        }
    }

    /// The adapter this engine drives.
    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// The spec this engine runs under.
    #[must_use]
    pub fn spec(&self) -> &ReconcileSpec {
        &self.spec
    }

    /// The database backend, when configured.
    #[must_use]
    pub fn db(&self) -> Option<&dyn DatabaseBackend> {
        self.db.as_deref()
    }

    /// Drops any cached record for this spec, forcing the next run to
    /// rebuild. Call after out-of-band mutations.
    pub fn invalidate_cache(&self) {
        self.cache
            .invalidate(&self.spec.cache_key(self.adapter.name()));
    }

    /// Builds the three indices concurrently. All loads complete before
    /// this returns; the first error aborts the build.
    async fn build_record(&self) -> Result<CacheRecord<A>> {
        let (db_index, gd_index, storage_set) = tokio::try_join!(
            self.adapter
                .load_db_index(self.db.as_deref(), &self.spec.server_profile),
            self.adapter.load_gamedata_index(
                self.storage.as_ref(),
                &self.spec.gamedata_object,
                &self.spec.gamedata_paths,
            ),
            self.adapter.load_storage_set(
                self.storage.as_ref(),
                &self.spec.storage_prefix,
                &self.spec.storage_extension,
            ),
        )?;

        Ok(CacheRecord::new(
            db_index,
            gd_index,
            storage_set,
            self.spec.cache_ttl,
        ))
    }

    /// The current record: cached when the spec enables caching, fresh
    /// otherwise.
    pub(crate) async fn record(&self) -> Result<Arc<CacheRecord<A>>> {
        if self.spec.cache_ttl.is_zero() {
            return Ok(Arc::new(self.build_record().await?));
        }
        self.cache
            .get_or_build(
                &self.spec.cache_key(self.adapter.name()),
                self.build_record(),
            )
            .await
    }

    /// Performs a full reconciliation across all entities.
    ///
    /// Builds (or reuses) the indices, forms the union of keys from all
    /// three sources, and returns one result per key, sorted by key for
    /// deterministic output.
    ///
    /// # Errors
    ///
    /// Returns the first load error; a source that is merely *empty* is
    /// an absence, not an error.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileResult>> {
        let record = self.record().await?;

        let mut results: Vec<ReconcileResult> = union_keys(&record)
            .into_iter()
            .map(|key| self.build_result(&key, &record))
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::debug!(
            adapter = self.adapter.name(),
            total = results.len(),
            "reconciled all entities"
        );

        Ok(results)
    }

    /// Performs a targeted reconciliation for a single entity.
    ///
    /// With caching enabled the cached indices answer the query; keys are
    /// located by direct ID match (name and classname only match when
    /// they equal a key outright). Without caching, the adapter's
    /// targeted query paths run instead, avoiding a full index build.
    pub async fn reconcile_one(&self, query: &Query) -> Result<ReconcileResult> {
        if !self.spec.cache_ttl.is_zero() {
            let record = self.record().await?;

            return Ok(match find_key_from_query(query, &record) {
                Some(key) => self.build_result(&key, &record),
                None => ReconcileResult {
                    id: query.id.clone().unwrap_or_default(),
                    name: String::new(),
                    db_present: false,
                    storage_present: false,
                    gamedata_present: false,
                    mismatch: Vec::new(),
                    metadata: BTreeMap::new(),
                },
            });
        }

        let db_item = self
            .adapter
            .query_db(self.db.as_deref(), &self.spec.server_profile, query)
            .await?;
        let gd_item = self
            .adapter
            .query_gamedata(
                self.storage.as_ref(),
                &self.spec.gamedata_object,
                &self.spec.gamedata_paths,
                query,
            )
            .await?;

        // A key for the storage check: from whichever item was found,
        // else the query's ID.
        let key = db_item
            .as_ref()
            .map(|item| self.adapter.db_key(item))
            .or_else(|| gd_item.as_ref().map(|item| self.adapter.gd_key(item)))
            .or_else(|| query.id.clone())
            .unwrap_or_default();

        let storage_present = if key.is_empty() {
            false
        } else {
            self.adapter
                .check_storage(
                    self.storage.as_ref(),
                    &self.spec.storage_prefix,
                    &self.spec.storage_extension,
                    &key,
                )
                .await?
        };

        let mismatch = match (&db_item, &gd_item) {
            (Some(db), Some(gd)) => self.adapter.compare_fields(db, gd),
            _ => Vec::new(),
        };

        Ok(ReconcileResult {
            id: key,
            name: self.adapter.resolve_name(db_item.as_ref(), gd_item.as_ref()),
            metadata: self.adapter.metadata(db_item.as_ref(), gd_item.as_ref()),
            db_present: db_item.is_some(),
            gamedata_present: gd_item.is_some(),
            storage_present,
            mismatch,
        })
    }

    /// Assembles the result for one key from the indices.
    pub(crate) fn build_result(&self, key: &str, record: &CacheRecord<A>) -> ReconcileResult {
        let db_item = record.db_index.get(key);
        let gd_item = record.gd_index.get(key);
        let storage_present = record.storage_set.contains(key);

        let (name, metadata) = if db_item.is_some() || gd_item.is_some() {
            (
                self.adapter.resolve_name(db_item, gd_item),
                self.adapter.metadata(db_item, gd_item),
            )
        } else {
            (String::new(), BTreeMap::new())
        };

        let mismatch = match (db_item, gd_item) {
            (Some(db), Some(gd)) => self.adapter.compare_fields(db, gd),
            _ => Vec::new(),
        };

        ReconcileResult {
            id: key.to_string(),
            name,
            db_present: db_item.is_some(),
            gamedata_present: gd_item.is_some(),
            storage_present,
            mismatch,
            metadata,
        }
    }
}

/// The union of keys across all three indices.
pub(crate) fn union_keys<A: Adapter>(record: &CacheRecord<A>) -> Vec<String> {
    let mut union: Vec<String> = Vec::with_capacity(
        record.db_index.len() + record.gd_index.len() + record.storage_set.len(),
    );
    let mut seen = std::collections::HashSet::with_capacity(union.capacity());

    for key in record
        .db_index
        .keys()
        .chain(record.gd_index.keys())
        .chain(record.storage_set.iter())
    {
        if seen.insert(key.as_str()) {
            union.push(key.clone());
        }
    }

    union
}

/// Locates the entity key a query refers to, using cached indices only.
///
/// Direct ID matches win; name and classname match only when they equal
/// an index key outright. No linear scan over item fields happens here -
/// unresolvable queries report absence quickly.
fn find_key_from_query<A: Adapter>(query: &Query, record: &CacheRecord<A>) -> Option<String> {
    if let Some(id) = &query.id {
        if record.db_index.contains_key(id) || record.gd_index.contains_key(id) {
            return Some(id.clone());
        }
    }

    for candidate in [&query.name, &query.classname].into_iter().flatten() {
        if record.db_index.contains_key(candidate) || record.gd_index.contains_key(candidate) {
            return Some(candidate.clone());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::testutil::MockAdapter;
    use crate::storage::MemoryBackend;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn spec(cache_ttl: Duration) -> ReconcileSpec {
        ReconcileSpec {
            cache_ttl,
            storage_prefix: "bundled/furniture".into(),
            storage_extension: ".nitro".into(),
            gamedata_paths: vec![],
            gamedata_object: "gamedata/FurnitureData.json".into(),
            server_profile: "arcturus".into(),
        }
    }

    fn engine(adapter: MockAdapter, cache_ttl: Duration) -> Engine<MockAdapter> {
        Engine::new(
            Arc::new(adapter),
            spec(cache_ttl),
            None,
            Arc::new(MemoryBackend::new()),
        )
    }

    #[tokio::test]
    async fn test_reconcile_all_builds_union_with_presence_bits() {
        let adapter = MockAdapter::with_indices(&["1", "2"], &["2", "3"], &["2", "4"]);
        let engine = engine(adapter, Duration::ZERO);

        let results = engine.reconcile_all().await.expect("should succeed");

        // Sorted union of {1,2} ∪ {2,3} ∪ {2,4}
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);

        let by_id = |id: &str| results.iter().find(|r| r.id == id).expect("present");
        assert!(by_id("1").db_present && !by_id("1").gamedata_present && !by_id("1").storage_present);
        assert!(by_id("2").db_present && by_id("2").gamedata_present && by_id("2").storage_present);
        assert!(!by_id("3").db_present && by_id("3").gamedata_present && !by_id("3").storage_present);
        assert!(!by_id("4").db_present && !by_id("4").gamedata_present && by_id("4").storage_present);
    }

    #[tokio::test]
    async fn test_mismatches_only_when_both_sources_present() {
        let mut adapter = MockAdapter::with_indices(&["1", "2"], &["1", "3"], &[]);
        adapter
            .mismatches
            .insert("1".into(), vec!["width: gd=2 db=1".into()]);
        // A mismatch entry for a DB-only item must never surface.
        adapter
            .mismatches
            .insert("2".into(), vec!["should not appear".into()]);
        let engine = engine(adapter, Duration::ZERO);

        let results = engine.reconcile_all().await.expect("should succeed");

        let by_id = |id: &str| results.iter().find(|r| r.id == id).expect("present");
        assert_eq!(by_id("1").mismatch, vec!["width: gd=2 db=1".to_string()]);
        assert!(by_id("2").mismatch.is_empty());
        assert!(by_id("3").mismatch.is_empty());
    }

    #[tokio::test]
    async fn test_empty_sources_reconcile_to_nothing() {
        let engine = engine(MockAdapter::default(), Duration::ZERO);
        let results = engine.reconcile_all().await.expect("should succeed");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_load_error_aborts_reconciliation() {
        for which in ["db", "gd", "storage"] {
            let mut adapter = MockAdapter::with_indices(&["1"], &["1"], &["1"]);
            match which {
                "db" => adapter.fail_db = Some("db down".into()),
                "gd" => adapter.fail_gd = Some("gamedata unreadable".into()),
                _ => adapter.fail_storage = Some("listing failed".into()),
            }
            let engine = engine(adapter, Duration::ZERO);
            assert!(engine.reconcile_all().await.is_err(), "{which} load error");
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_one_build() {
        let mut adapter = MockAdapter::with_indices(&["1"], &["1"], &["1"]);
        adapter.load_delay = Duration::from_millis(25);
        let engine = Arc::new(engine(adapter, Duration::from_secs(60)));

        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.reconcile_all().await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.reconcile_all().await })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);

        // Each load ran exactly once: the second run joined the first
        // build rather than stampeding.
        assert_eq!(engine.adapter().db_loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.adapter().gd_loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.adapter().storage_loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconcile_one_cached_hits_by_id() {
        let adapter = MockAdapter::with_indices(&["100"], &["100"], &["100"]);
        let engine = engine(adapter, Duration::from_secs(60));

        let result = engine
            .reconcile_one(&Query {
                id: Some("100".into()),
                ..Query::default()
            })
            .await
            .expect("should succeed");

        assert_eq!(result.id, "100");
        assert!(result.db_present && result.gamedata_present && result.storage_present);
    }

    #[tokio::test]
    async fn test_reconcile_one_cached_miss_reports_absence() {
        let adapter = MockAdapter::with_indices(&["100"], &["100"], &[]);
        let engine = engine(adapter, Duration::from_secs(60));

        let result = engine
            .reconcile_one(&Query {
                id: Some("999".into()),
                ..Query::default()
            })
            .await
            .expect("absence is not an error");

        assert_eq!(result.id, "999");
        assert!(!result.db_present && !result.gamedata_present && !result.storage_present);
    }

    #[tokio::test]
    async fn test_reconcile_one_uncached_uses_targeted_queries() {
        let adapter = MockAdapter::with_indices(&["7"], &["7"], &["7"]);
        let engine = engine(adapter, Duration::ZERO);

        let result = engine
            .reconcile_one(&Query {
                id: Some("7".into()),
                ..Query::default()
            })
            .await
            .expect("should succeed");

        assert_eq!(result.id, "7");
        assert!(result.db_present && result.gamedata_present && result.storage_present);
        // The full indices were never built.
        assert_eq!(engine.adapter().db_loads.load(Ordering::SeqCst), 0);
        assert_eq!(engine.adapter().storage_loads.load(Ordering::SeqCst), 0);
    }
}
