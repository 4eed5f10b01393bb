//! TTL cache for built indices, with stampede protection.
//!
//! Records are immutable once built and shared behind `Arc`, so readers
//! never block builders. A per-key async barrier coalesces concurrent
//! misses: the first caller rebuilds, followers wait and receive the
//! same record.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

use super::adapter::Adapter;

/// Pre-built indices for one reconciliation spec.
pub struct CacheRecord<A: Adapter> {
    /// Database items by entity key.
    pub db_index: HashMap<String, A::Db>,

    /// Gamedata items by entity key.
    pub gd_index: HashMap<String, A::Gd>,

    /// Entity keys present in storage.
    pub storage_set: HashSet<String>,

    built_at: Instant,
    ttl: Duration,
}

impl<A: Adapter> CacheRecord<A> {
    /// Creates a record stamped now.
    #[must_use]
    pub fn new(
        db_index: HashMap<String, A::Db>,
        gd_index: HashMap<String, A::Gd>,
        storage_set: HashSet<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            db_index,
            gd_index,
            storage_set,
            built_at: Instant::now(),
            ttl,
        }
    }

    /// Whether this record is still within its TTL.
    ///
    /// A zero TTL means caching is disabled; such a record is never
    /// fresh.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        !self.ttl.is_zero() && self.built_at.elapsed() <= self.ttl
    }
}

impl<A: Adapter> std::fmt::Debug for CacheRecord<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRecord")
            .field("db_index", &self.db_index.len())
            .field("gd_index", &self.gd_index.len())
            .field("storage_set", &self.storage_set.len())
            .field("built_at", &self.built_at)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Record store keyed by spec cache key.
pub(crate) struct CacheStore<A: Adapter> {
    records: RwLock<HashMap<String, Arc<CacheRecord<A>>>>,
    // One barrier per key with a build in flight; holders rebuild,
    // waiters re-check. Entries are evicted when their flight completes.
    barriers: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<A: Adapter> CacheStore<A> {
    pub(crate) fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            barriers: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self, key: &str) -> Result<Option<Arc<CacheRecord<A>>>> {
        let records = self.records.read().map_err(|_| Error::Internal {
            message: "cache lock poisoned".into(),
        })?;
        Ok(records.get(key).filter(|r| r.is_fresh()).cloned())
    }

    /// Returns the fresh record for `key`, or rebuilds it via `build`.
    ///
    /// Concurrent callers for the same key coalesce: exactly one build
    /// future is awaited, and everyone receives the record it produced.
    pub(crate) async fn get_or_build<F>(&self, key: &str, build: F) -> Result<Arc<CacheRecord<A>>>
    where
        F: Future<Output = Result<CacheRecord<A>>>,
    {
        // Fast path.
        if let Some(record) = self.fresh(key)? {
            return Ok(record);
        }

        let barrier = {
            let mut barriers = self.barriers.lock().await;
            Arc::clone(barriers.entry(key.to_string()).or_default())
        };

        let guard = barrier.lock().await;
        let result = async {
            // A rebuild may have completed while we waited on the
            // barrier.
            if let Some(record) = self.fresh(key)? {
                return Ok(record);
            }

            let record = Arc::new(build.await?);

            let mut records = self.records.write().map_err(|_| Error::Internal {
                message: "cache lock poisoned".into(),
            })?;
            records.insert(key.to_string(), Arc::clone(&record));

            Ok(record)
        }
        .await;
        drop(guard);

        // The flight is over: the last participant out drops the barrier
        // entry, so the map stays bounded by in-flight keys rather than
        // every key ever seen. Callers arriving later start a new flight.
        {
            let mut barriers = self.barriers.lock().await;
            if let Some(entry) = barriers.get(key) {
                // Two strong refs means the map's and ours; any other
                // participant still on its way out keeps the entry alive
                // and removes it itself.
                if Arc::ptr_eq(entry, &barrier) && Arc::strong_count(entry) <= 2 {
                    barriers.remove(key);
                }
            }
        }

        result
    }

    /// Drops the record for `key`, forcing the next caller to rebuild.
    pub(crate) fn invalidate(&self, key: &str) {
        if let Ok(mut records) = self.records.write() {
            records.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::testutil::MockAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(ttl: Duration) -> CacheRecord<MockAdapter> {
        CacheRecord::new(HashMap::new(), HashMap::new(), HashSet::new(), ttl)
    }

    #[test]
    fn test_zero_ttl_is_never_fresh() {
        assert!(!record(Duration::ZERO).is_fresh());
        assert!(record(Duration::from_secs(60)).is_fresh());
    }

    #[tokio::test]
    async fn test_get_or_build_caches_result() {
        let store: CacheStore<MockAdapter> = CacheStore::new();
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            store
                .get_or_build("k", async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(record(Duration::from_secs(60)))
                })
                .await
                .expect("build should succeed");
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_record_rebuilds() {
        let store: CacheStore<MockAdapter> = CacheStore::new();
        let builds = AtomicUsize::new(0);

        let build = |builds: &AtomicUsize| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(record(Duration::from_millis(5)))
        };

        store.get_or_build("k", async { build(&builds) }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.get_or_build("k", async { build(&builds) }).await.unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let store: Arc<CacheStore<MockAdapter>> = Arc::new(CacheStore::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let builds = Arc::clone(&builds);
            handles.push(tokio::spawn(async move {
                store
                    .get_or_build("k", async {
                        builds.fetch_add(1, Ordering::SeqCst);
                        // Widen the race window so all tasks arrive
                        // before the build completes.
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(record(Duration::from_secs(60)))
                    })
                    .await
                    .expect("build should succeed");
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_barrier_entries_do_not_outlive_their_flight() {
        let store: Arc<CacheStore<MockAdapter>> = Arc::new(CacheStore::new());

        // Cycle through many distinct keys, including a contended one.
        for i in 0..32 {
            let key = format!("spec-{i}");
            store
                .get_or_build(&key, async { Ok(record(Duration::from_secs(60))) })
                .await
                .expect("build should succeed");
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .get_or_build("contended", async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(record(Duration::from_secs(60)))
                    })
                    .await
                    .expect("build should succeed");
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        assert!(
            store.barriers.lock().await.is_empty(),
            "completed flights must not leave barrier entries behind"
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let store: CacheStore<MockAdapter> = CacheStore::new();
        let builds = AtomicUsize::new(0);

        store
            .get_or_build("k", async {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(record(Duration::from_secs(60)))
            })
            .await
            .unwrap();

        store.invalidate("k");

        store
            .get_or_build("k", async {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(record(Duration::from_secs(60)))
            })
            .await
            .unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_build_error_propagates_and_caches_nothing() {
        let store: CacheStore<MockAdapter> = CacheStore::new();

        let err = store
            .get_or_build("k", async { Err(Error::storage("listing failed")) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));

        // Next caller rebuilds successfully.
        store
            .get_or_build("k", async { Ok(record(Duration::from_secs(60))) })
            .await
            .expect("second build should succeed");
    }
}
