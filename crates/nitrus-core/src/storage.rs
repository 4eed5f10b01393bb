//! Storage backend abstraction for object storage (S3-compatible, local).
//!
//! This module defines the storage contract the reconcile engine consumes.
//! Backends are bucket-scoped: a backend instance addresses one bucket (or
//! one directory tree), and all paths are object keys relative to it.
//!
//! Two implementations ship with the core:
//! - [`MemoryBackend`] for tests
//! - [`FsBackend`] for local asset trees (the common deployment for
//!   self-hosted pipelines)

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key), relative to the backend root.
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait for object storage.
///
/// The contract is designed for cloud object storage semantics: flat
/// keyspace, prefix listing, idempotent deletes.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns [`Error::NotFound`] if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes an object, replacing any existing content.
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Deletes an object.
    ///
    /// Succeeds even if the object doesn't exist (idempotent).
    async fn delete(&self, path: &str) -> Result<()>;

    /// Deletes many objects, returning the paths that failed with their
    /// errors.
    ///
    /// The default implementation deletes sequentially; backends with a
    /// bulk-delete primitive should override it. A non-empty return is not
    /// itself an error - callers decide whether partial failure aborts.
    async fn delete_batch(&self, paths: Vec<String>) -> Result<Vec<(String, Error)>> {
        let mut failures = Vec::new();
        for path in paths {
            if let Err(err) = self.delete(&path).await {
                failures.push((path, err));
            }
        }
        Ok(failures)
    }

    /// Lists objects with the given prefix.
    ///
    /// Returns an empty vec if no objects match.
    ///
    /// **Ordering**: results are returned in arbitrary order that may vary
    /// between backends and invocations. Callers requiring deterministic
    /// order should sort.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Checks whether an object exists without reading its content.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// In-memory storage backend for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .insert(
                path.to_string(),
                StoredObject {
                    data,
                    last_modified: Utc::now(),
                },
            );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        Ok(objects.contains_key(path))
    }
}

/// Local-filesystem storage backend.
///
/// Maps object keys onto paths under a root directory. Key separators are
/// `/` regardless of platform; nested keys create nested directories on
/// write.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Creates a backend rooted at the given directory.
    ///
    /// The directory does not need to exist yet; reads against a missing
    /// root behave as an empty bucket.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != "..") {
            full.push(part);
        }
        full
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        match tokio::fs::read(self.resolve(path)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object not found: {path}")))
            }
            Err(err) => Err(Error::storage_with_source(
                format!("failed to read {path}"),
                err,
            )),
        }
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| Error::storage_with_source(format!("failed to create {path}"), err))?;
        }
        tokio::fs::write(&full, &data)
            .await
            .map_err(|err| Error::storage_with_source(format!("failed to write {path}"), err))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::storage_with_source(
                format!("failed to delete {path}"),
                err,
            )),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut results = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(Error::storage_with_source(
                        format!("failed to list {}", dir.display()),
                        err,
                    ));
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|err| {
                Error::storage_with_source(format!("failed to list {}", dir.display()), err)
            })? {
                let meta = entry.metadata().await.map_err(|err| {
                    Error::storage_with_source(format!("failed to stat {}", dir.display()), err)
                })?;
                if meta.is_dir() {
                    pending.push(entry.path());
                    continue;
                }

                let rel = entry
                    .path()
                    .strip_prefix(&self.root)
                    .map(|p| {
                        p.components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .unwrap_or_default();

                if rel.starts_with(prefix) {
                    results.push(ObjectMeta {
                        path: rel,
                        size: meta.len(),
                        last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    });
                }
            }
        }

        Ok(results)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match tokio::fs::metadata(self.resolve(path)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::storage_with_source(
                format!("failed to stat {path}"),
                err,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        let data = Bytes::from("hello world");

        backend
            .put("test/file.txt", data.clone())
            .await
            .expect("put should succeed");

        let retrieved = backend
            .get("test/file.txt")
            .await
            .expect("get should succeed");
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_memory_get_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.get("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_list_with_prefix() {
        let backend = MemoryBackend::new();

        backend.put("a/1.txt", Bytes::from("a1")).await.unwrap();
        backend.put("a/2.txt", Bytes::from("a2")).await.unwrap();
        backend.put("b/1.txt", Bytes::from("b1")).await.unwrap();

        let list_a = backend.list("a/").await.expect("should succeed");
        assert_eq!(list_a.len(), 2);

        let list_b = backend.list("b/").await.expect("should succeed");
        assert_eq!(list_b.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_delete_is_idempotent() {
        let backend = MemoryBackend::new();

        backend.put("del.txt", Bytes::from("data")).await.unwrap();
        assert!(backend.exists("del.txt").await.unwrap());

        backend.delete("del.txt").await.expect("should succeed");
        assert!(!backend.exists("del.txt").await.unwrap());

        // Deleting again is fine
        backend.delete("del.txt").await.expect("should succeed");
    }

    #[tokio::test]
    async fn test_memory_delete_batch_reports_no_failures() {
        let backend = MemoryBackend::new();
        backend.put("x/1", Bytes::from("1")).await.unwrap();
        backend.put("x/2", Bytes::from("2")).await.unwrap();

        let failures = backend
            .delete_batch(vec!["x/1".into(), "x/2".into(), "x/ghost".into()])
            .await
            .expect("batch should succeed");
        assert!(failures.is_empty());
        assert!(backend.list("").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_fs_backend_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FsBackend::new(dir.path());

        backend
            .put("bundled/furniture/chair.nitro", Bytes::from(&b"bin"[..]))
            .await
            .expect("put should succeed");

        let data = backend
            .get("bundled/furniture/chair.nitro")
            .await
            .expect("get should succeed");
        assert_eq!(data, Bytes::from(&b"bin"[..]));

        assert!(backend.exists("bundled/furniture/chair.nitro").await.unwrap());
        assert!(!backend.exists("bundled/furniture/table.nitro").await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_backend_list_uses_slash_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FsBackend::new(dir.path());

        backend
            .put("bundled/furniture/chair.nitro", Bytes::from(&b"a"[..]))
            .await
            .unwrap();
        backend
            .put("bundled/furniture/sub/rug.nitro", Bytes::from(&b"b"[..]))
            .await
            .unwrap();
        backend
            .put("gamedata/FurnitureData.json", Bytes::from(&b"{}"[..]))
            .await
            .unwrap();

        let mut listed: Vec<String> = backend
            .list("bundled/furniture")
            .await
            .expect("list should succeed")
            .into_iter()
            .map(|m| m.path)
            .collect();
        listed.sort();

        assert_eq!(
            listed,
            vec![
                "bundled/furniture/chair.nitro".to_string(),
                "bundled/furniture/sub/rug.nitro".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_fs_backend_missing_root_lists_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FsBackend::new(dir.path().join("does-not-exist"));

        let listed = backend.list("").await.expect("list should succeed");
        assert!(listed.is_empty());
    }
}
