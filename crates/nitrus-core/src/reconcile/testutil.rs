//! In-memory adapter and mutator doubles shared by the reconcile tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::db::DatabaseBackend;
use crate::error::{Error, Result};
use crate::storage::StorageBackend;

use super::adapter::{Adapter, BatchMutator, Mutator};
use super::types::{Action, Query};

/// Test adapter whose items are their own keys.
///
/// Load methods return pre-seeded indices, count invocations, and can be
/// told to fail or to dawdle (for coalescing tests).
#[derive(Default)]
pub(crate) struct MockAdapter {
    pub db_index: HashMap<String, String>,
    pub gd_index: HashMap<String, String>,
    pub storage_set: HashSet<String>,
    pub mismatches: HashMap<String, Vec<String>>,

    pub fail_db: Option<String>,
    pub fail_gd: Option<String>,
    pub fail_storage: Option<String>,
    pub load_delay: Duration,

    pub db_loads: AtomicUsize,
    pub gd_loads: AtomicUsize,
    pub storage_loads: AtomicUsize,
    pub prepares: AtomicUsize,

    pub mutator: Option<MockMutator>,
}

impl MockAdapter {
    pub fn with_indices(
        db: &[&str],
        gd: &[&str],
        storage: &[&str],
    ) -> Self {
        Self {
            db_index: db.iter().map(|k| ((*k).to_string(), (*k).to_string())).collect(),
            gd_index: gd.iter().map(|k| ((*k).to_string(), (*k).to_string())).collect(),
            storage_set: storage.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    type Db = String;
    type Gd = String;

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn load_db_index(
        &self,
        _db: Option<&dyn DatabaseBackend>,
        _server_profile: &str,
    ) -> Result<HashMap<String, String>> {
        self.db_loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if let Some(msg) = &self.fail_db {
            return Err(Error::database(msg.clone()));
        }
        Ok(self.db_index.clone())
    }

    async fn load_gamedata_index(
        &self,
        _storage: &dyn StorageBackend,
        _object: &str,
        _paths: &[String],
    ) -> Result<HashMap<String, String>> {
        self.gd_loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if let Some(msg) = &self.fail_gd {
            return Err(Error::storage(msg.clone()));
        }
        Ok(self.gd_index.clone())
    }

    async fn load_storage_set(
        &self,
        _storage: &dyn StorageBackend,
        _prefix: &str,
        _extension: &str,
    ) -> Result<HashSet<String>> {
        self.storage_loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if let Some(msg) = &self.fail_storage {
            return Err(Error::storage(msg.clone()));
        }
        Ok(self.storage_set.clone())
    }

    fn db_key(&self, item: &String) -> String {
        item.clone()
    }

    fn gd_key(&self, item: &String) -> String {
        item.clone()
    }

    fn storage_key(&self, object_key: &str, prefix: &str, extension: &str) -> Option<String> {
        let stripped = object_key.strip_prefix(prefix)?.trim_start_matches('/');
        Some(stripped.strip_suffix(extension)?.to_string())
    }

    fn resolve_name(&self, db_item: Option<&String>, gd_item: Option<&String>) -> String {
        db_item.or(gd_item).cloned().unwrap_or_default()
    }

    fn metadata(
        &self,
        _db_item: Option<&String>,
        _gd_item: Option<&String>,
    ) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn compare_fields(&self, db_item: &String, _gd_item: &String) -> Vec<String> {
        self.mismatches.get(db_item).cloned().unwrap_or_default()
    }

    async fn query_db(
        &self,
        _db: Option<&dyn DatabaseBackend>,
        _server_profile: &str,
        query: &Query,
    ) -> Result<Option<String>> {
        Ok(query.id.as_ref().and_then(|id| self.db_index.get(id)).cloned())
    }

    async fn query_gamedata(
        &self,
        _storage: &dyn StorageBackend,
        _object: &str,
        _paths: &[String],
        query: &Query,
    ) -> Result<Option<String>> {
        Ok(query.id.as_ref().and_then(|id| self.gd_index.get(id)).cloned())
    }

    async fn check_storage(
        &self,
        _storage: &dyn StorageBackend,
        _prefix: &str,
        _extension: &str,
        key: &str,
    ) -> Result<bool> {
        Ok(self.storage_set.contains(key))
    }

    async fn prepare(&self, _db: &dyn DatabaseBackend, _server_profile: &str) -> Result<()> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn mutator(&self) -> Option<&dyn Mutator<Gd = String>> {
        self.mutator.as_ref().map(|m| m as &dyn Mutator<Gd = String>)
    }
}

/// Recording mutator. Each executed call appends `"<op>:<key>"`; batch
/// methods, when enabled, record one `"batch_<op>:<k1>,<k2>"` entry.
#[derive(Default)]
pub(crate) struct MockMutator {
    pub calls: Mutex<Vec<String>>,
    pub offer_batch: bool,
    /// Key whose single-item mutation fails, for abort tests.
    pub fail_key: Option<String>,
}

impl MockMutator {
    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, op: &str, key: &str) -> Result<()> {
        if self.fail_key.as_deref() == Some(key) {
            return Err(Error::database(format!("injected failure for {key}")));
        }
        self.calls.lock().expect("lock").push(format!("{op}:{key}"));
        Ok(())
    }
}

#[async_trait]
impl Mutator for MockMutator {
    type Gd = String;

    async fn delete_db(&self, key: &str) -> Result<()> {
        self.record("delete_db", key)
    }

    async fn delete_gamedata(&self, key: &str) -> Result<()> {
        self.record("delete_gamedata", key)
    }

    async fn delete_storage(&self, key: &str) -> Result<()> {
        self.record("delete_storage", key)
    }

    async fn sync_db_from_gamedata(&self, key: &str, _gd_item: &String) -> Result<()> {
        self.record("sync_db", key)
    }

    fn batch(&self) -> Option<&dyn BatchMutator<Gd = String>> {
        self.offer_batch.then_some(self as &dyn BatchMutator<Gd = String>)
    }
}

#[async_trait]
impl BatchMutator for MockMutator {
    type Gd = String;

    async fn delete_db_batch(&self, keys: &[String]) -> Result<()> {
        self.record("batch_delete_db", &keys.join(","))
    }

    async fn delete_gamedata_batch(&self, keys: &[String]) -> Result<()> {
        self.record("batch_delete_gamedata", &keys.join(","))
    }

    async fn delete_storage_batch(&self, keys: &[String]) -> Result<()> {
        self.record("batch_delete_storage", &keys.join(","))
    }

    async fn sync_db_batch(&self, actions: &[Action<String>]) -> Result<()> {
        let keys: Vec<&str> = actions.iter().map(|a| a.key.as_str()).collect();
        self.record("batch_sync_db", &keys.join(","))
    }
}
