//! Batch mutations: the [`BatchMutator`] fast paths.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Mutex;

use nitrus_core::db::SqlValue;
use nitrus_core::error::{Error, Result};
use nitrus_core::reconcile::{Action, BatchMutator, Mutator};

use crate::adapter::FurnitureAdapter;
use crate::gamedata::GdItem;
use crate::profile::{LogicalColumn, ServerProfile};

#[async_trait]
impl BatchMutator for FurnitureAdapter {
    type Gd = GdItem;

    /// Deletes many rows in one `IN`-clause statement.
    ///
    /// Non-numeric keys cannot address a row and are skipped with a
    /// warning rather than failing the batch.
    async fn delete_db_batch(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let ctx = self.mutation_context()?;
        let db = self.mutation_db()?;
        let profile = ServerProfile::by_name(&ctx.server_profile);

        let mut sprite_ids: Vec<SqlValue> = Vec::with_capacity(keys.len());
        for key in keys {
            match key.parse::<i64>() {
                Ok(id) => sprite_ids.push(SqlValue::Integer(id)),
                Err(_) => {
                    tracing::warn!(key, "skipping non-numeric key in db delete batch");
                }
            }
        }
        if sprite_ids.is_empty() {
            return Ok(());
        }

        let column = profile
            .column(LogicalColumn::SpriteId)
            .ok_or_else(|| Error::database("profile has no sprite_id column"))?;
        let placeholders = vec!["?"; sprite_ids.len()].join(", ");

        let affected = db
            .execute(
                &format!(
                    "DELETE FROM {} WHERE {} IN ({placeholders})",
                    profile.table, column
                ),
                sprite_ids,
            )
            .await?;

        tracing::debug!(affected, "batch deleted db rows");
        Ok(())
    }

    /// Removes all given IDs from the catalog in a single
    /// read-modify-write cycle.
    async fn delete_gamedata_batch(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut ids = HashSet::new();
        for key in keys {
            match key.parse::<i64>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => {
                    tracing::warn!(key, "skipping non-numeric key in gamedata delete batch");
                }
            }
        }
        if ids.is_empty() {
            return Ok(());
        }

        self.remove_from_catalog(&ids).await?;
        Ok(())
    }

    /// Deletes many storage objects through the backend's bulk
    /// primitive, aggregating per-object failures.
    async fn delete_storage_batch(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let ctx = self.mutation_context()?;

        let object_keys: Vec<String> = keys
            .iter()
            .map(|key| self.object_key_for(key, &ctx.storage_prefix, &ctx.storage_extension))
            .collect();

        let failures = ctx.storage.delete_batch(object_keys).await?;
        if !failures.is_empty() {
            let detail: Vec<String> = failures
                .iter()
                .map(|(path, err)| format!("{path}: {err}"))
                .collect();
            return Err(Error::storage(format!(
                "batch delete had {} errors: {}",
                failures.len(),
                detail.join("; ")
            )));
        }

        Ok(())
    }

    /// Applies sync actions through a bounded worker pool.
    ///
    /// Each worker's update targets a distinct `sprite_id`, so the
    /// writes never contend at row granularity - only on the backend's
    /// connection limit, which the pool size stays under.
    async fn sync_db_batch(&self, actions: &[Action<GdItem>]) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let workers = self.mutation_context()?.sync_workers.max(1);
        let errors: Mutex<Vec<String>> = Mutex::new(Vec::new());

        futures::stream::iter(actions)
            .for_each_concurrent(workers, |action| {
                let errors = &errors;
                async move {
                    let outcome = match &action.gd_item {
                        Some(gd) => self.sync_db_from_gamedata(&action.key, gd).await,
                        None => Err(Error::internal(format!(
                            "sync action for {} carries no gamedata item",
                            action.key
                        ))),
                    };
                    if let Err(err) = outcome {
                        errors
                            .lock()
                            .expect("error list lock")
                            .push(format!("sync failed for {}: {err}", action.key));
                    }
                }
            })
            .await;

        let errors = errors.into_inner().expect("error list lock");
        if !errors.is_empty() {
            return Err(Error::database(format!(
                "batch sync had {} errors: {}",
                errors.len(),
                errors.join("; ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutations::tests::fixture;
    use bytes::Bytes;
    use nitrus_core::db::{DatabaseBackend, SqlValue};
    use nitrus_core::reconcile::ActionKind;
    use nitrus_core::storage::StorageBackend;

    fn sync_action(key: &str, gd: GdItem) -> Action<GdItem> {
        Action {
            kind: ActionKind::SyncDb,
            key: key.to_string(),
            reason: "mismatch".into(),
            gd_item: Some(gd),
        }
    }

    #[tokio::test]
    async fn test_delete_db_batch_uses_in_clause_and_skips_bad_keys() {
        let (adapter, db, _storage) = fixture().await;

        adapter
            .delete_db_batch(&["100".into(), "ghost".into(), "5".into()])
            .await
            .expect("batch delete");

        let rows = db.query("SELECT * FROM items_base", vec![]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_delete_db_batch_with_only_bad_keys_is_a_no_op() {
        let (adapter, db, _storage) = fixture().await;

        adapter
            .delete_db_batch(&["ghost".into(), "old/rug".into()])
            .await
            .expect("nothing to do");

        let rows = db.query("SELECT * FROM items_base", vec![]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_gamedata_batch_is_one_rewrite() {
        let (adapter, _db, storage) = fixture().await;

        adapter
            .delete_gamedata_batch(&["100".into(), "5".into()])
            .await
            .expect("batch delete");

        let data = storage.get("gamedata/FurnitureData.json").await.unwrap();
        let doc = crate::gamedata::FurnitureData::parse(&data).unwrap();
        assert!(doc.roomitemtypes.furnitype.is_empty());
    }

    #[tokio::test]
    async fn test_delete_storage_batch_mixes_mapped_and_orphan_keys() {
        let (adapter, _db, storage) = fixture().await;
        storage
            .put("bundled/furniture/old/ghost.nitro", Bytes::from(&b"x"[..]))
            .await
            .unwrap();

        adapter
            .delete_storage_batch(&["100".into(), "old/ghost".into()])
            .await
            .expect("batch delete");

        assert!(!storage.exists("bundled/furniture/chair.nitro").await.unwrap());
        assert!(
            !storage
                .exists("bundled/furniture/old/ghost.nitro")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_sync_batch_applies_all_actions() {
        let (adapter, db, _storage) = fixture().await;

        let actions = vec![
            sync_action(
                "5",
                GdItem {
                    id: 5,
                    classname: "lamp".into(),
                    name: "Bright Lamp".into(),
                    xdim: 2,
                    ydim: 2,
                    ..GdItem::default()
                },
            ),
            sync_action(
                "100",
                GdItem {
                    id: 100,
                    classname: "chair".into(),
                    name: "Grand Chair".into(),
                    xdim: 1,
                    ydim: 1,
                    cansiton: true,
                    ..GdItem::default()
                },
            ),
        ];

        adapter.sync_db_batch(&actions).await.expect("batch sync");

        let rows = db
            .query(
                "SELECT public_name FROM items_base WHERE sprite_id = ?",
                vec![SqlValue::Integer(5)],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["public_name"].as_string(), "Bright Lamp");

        let rows = db
            .query(
                "SELECT public_name FROM items_base WHERE sprite_id = ?",
                vec![SqlValue::Integer(100)],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["public_name"].as_string(), "Grand Chair");
    }

    #[tokio::test]
    async fn test_sync_batch_aggregates_failures() {
        let (adapter, _db, _storage) = fixture().await;

        let actions = vec![
            sync_action(
                "5",
                GdItem {
                    id: 5,
                    classname: "lamp".into(),
                    name: "Bright Lamp".into(),
                    xdim: 1,
                    ydim: 1,
                    ..GdItem::default()
                },
            ),
            // No such row: the per-action failure must surface.
            sync_action(
                "999",
                GdItem {
                    id: 999,
                    classname: "void".into(),
                    ..GdItem::default()
                },
            ),
        ];

        let err = adapter.sync_db_batch(&actions).await.unwrap_err();
        assert!(err.to_string().contains("1 errors"), "{err}");
    }
}
