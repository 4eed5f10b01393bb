//! CLI command implementations.

pub mod check;
pub mod reconcile;

use anyhow::{Context, Result};
use std::sync::Arc;

use nitrus_core::db::{DatabaseBackend, SqliteBackend};
use nitrus_core::reconcile::ReconcileSpec;
use nitrus_core::storage::{FsBackend, StorageBackend};

use crate::Config;

/// Opens the configured backends.
pub(crate) fn open_backends(
    config: &Config,
) -> Result<(Option<Arc<dyn DatabaseBackend>>, Arc<dyn StorageBackend>)> {
    let db: Option<Arc<dyn DatabaseBackend>> = match &config.db {
        Some(path) => Some(Arc::new(
            SqliteBackend::open(path)
                .with_context(|| format!("failed to open database {}", path.display()))?,
        )),
        None => None,
    };
    let storage: Arc<dyn StorageBackend> = Arc::new(FsBackend::new(&config.asset_root));
    Ok((db, storage))
}

/// The reconciliation spec for the configured layout.
pub(crate) fn build_spec(config: &Config, cache_ttl_secs: u64) -> ReconcileSpec {
    ReconcileSpec {
        cache_ttl: std::time::Duration::from_secs(cache_ttl_secs),
        storage_prefix: config.prefix.clone(),
        storage_extension: config.extension.clone(),
        gamedata_paths: vec![],
        gamedata_object: config.gamedata_object.clone(),
        server_profile: config.profile.clone(),
    }
}
