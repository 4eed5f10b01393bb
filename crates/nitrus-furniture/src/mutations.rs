//! Single-item mutations: the [`Mutator`] capability.

use async_trait::async_trait;
use std::collections::HashSet;

use nitrus_core::db::{DatabaseBackend, SqlValue};
use nitrus_core::error::{Error, Result};
use nitrus_core::reconcile::{BatchMutator, Mutator};

use crate::adapter::FurnitureAdapter;
use crate::gamedata::{FurnitureData, GdItem};
use crate::profile::{LogicalColumn, ServerProfile};

/// Text fields are cut to this before sync writes: a buffer under the
/// `VARCHAR(120)` established by schema preparation.
const MAX_NAME_LEN: usize = 110;

pub(crate) fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

impl FurnitureAdapter {
    pub(crate) fn mutation_db(&self) -> Result<&dyn DatabaseBackend> {
        self.mutation_context()?
            .db
            .as_deref()
            .ok_or_else(|| Error::database("no database configured for mutations"))
    }

    fn parse_sprite_id(key: &str) -> Result<i64> {
        key.parse()
            .map_err(|_| Error::InvalidInput(format!("invalid key {key}: expected a numeric id")))
    }

    /// Rewrites the catalog document with the given IDs removed.
    ///
    /// One read-modify-write cycle under the catalog lock; unknown wire
    /// fields pass through untouched.
    pub(crate) async fn remove_from_catalog(&self, ids: &HashSet<i64>) -> Result<usize> {
        let ctx = self.mutation_context()?;
        let _guard = self.catalog_lock.lock().await;

        let data = ctx.storage.get(&ctx.gamedata_object).await?;
        let mut doc = FurnitureData::parse(&data)?;
        let removed = doc.remove_ids(ids);

        ctx.storage
            .put(&ctx.gamedata_object, doc.to_bytes()?.into())
            .await?;

        tracing::debug!(removed, object = %ctx.gamedata_object, "rewrote catalog");
        Ok(removed)
    }

    /// The column assignments a sync writes, in profile terms.
    pub(crate) fn sync_assignments(
        profile: &ServerProfile,
        gd: &GdItem,
    ) -> Vec<(&'static str, SqlValue)> {
        let mut assignments: Vec<(&'static str, SqlValue)> = Vec::new();
        let mut push = |field: LogicalColumn, value: SqlValue| {
            if let Some(column) = profile.column(field) {
                assignments.push((column, value));
            }
        };

        push(
            LogicalColumn::ItemName,
            SqlValue::Text(truncate(&gd.classname, MAX_NAME_LEN)),
        );
        push(
            LogicalColumn::PublicName,
            SqlValue::Text(truncate(&gd.name, MAX_NAME_LEN)),
        );
        push(LogicalColumn::Width, SqlValue::Integer(gd.xdim));
        push(LogicalColumn::Length, SqlValue::Integer(gd.ydim));
        // The catalog rarely carries stacking height; the emulator
        // default is 1.
        push(LogicalColumn::StackHeight, SqlValue::Integer(1));
        push(LogicalColumn::CanSit, SqlValue::from(gd.cansiton));
        push(LogicalColumn::CanWalk, SqlValue::from(gd.canstandon));
        push(LogicalColumn::CanLay, SqlValue::from(gd.canlayon));
        push(LogicalColumn::Kind, SqlValue::from(gd.kind.letter()));

        assignments
    }
}

#[async_trait]
impl Mutator for FurnitureAdapter {
    type Gd = GdItem;

    async fn delete_db(&self, key: &str) -> Result<()> {
        let ctx = self.mutation_context()?;
        let db = self.mutation_db()?;
        let profile = ServerProfile::by_name(&ctx.server_profile);
        let sprite_id = Self::parse_sprite_id(key)?;

        let column = profile
            .column(LogicalColumn::SpriteId)
            .ok_or_else(|| Error::database("profile has no sprite_id column"))?;

        db.execute(
            &format!("DELETE FROM {} WHERE {} = ?", profile.table, column),
            vec![SqlValue::Integer(sprite_id)],
        )
        .await?;

        Ok(())
    }

    async fn delete_gamedata(&self, key: &str) -> Result<()> {
        let id = Self::parse_sprite_id(key)?;
        self.remove_from_catalog(&HashSet::from([id])).await?;
        Ok(())
    }

    async fn delete_storage(&self, key: &str) -> Result<()> {
        let ctx = self.mutation_context()?;
        // A mapped numeric key deletes the canonical object; an orphan
        // key is already the relative path it was extracted from.
        let object_key =
            self.object_key_for(key, &ctx.storage_prefix, &ctx.storage_extension);
        ctx.storage.delete(&object_key).await
    }

    async fn sync_db_from_gamedata(&self, key: &str, gd_item: &GdItem) -> Result<()> {
        let ctx = self.mutation_context()?;
        let db = self.mutation_db()?;
        let profile = ServerProfile::by_name(&ctx.server_profile);
        let sprite_id = Self::parse_sprite_id(key)?;

        let sprite_column = profile
            .column(LogicalColumn::SpriteId)
            .ok_or_else(|| Error::database("profile has no sprite_id column"))?;

        let assignments = Self::sync_assignments(&profile, gd_item);
        let set_clause: Vec<String> = assignments
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect();
        let mut params: Vec<SqlValue> =
            assignments.into_iter().map(|(_, value)| value).collect();
        params.push(SqlValue::Integer(sprite_id));

        let affected = db
            .execute(
                &format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    profile.table,
                    set_clause.join(", "),
                    sprite_column
                ),
                params,
            )
            .await?;

        if affected == 0 {
            return Err(Error::database(format!(
                "no rows updated for key {key} (sprite_id {sprite_id})"
            )));
        }

        Ok(())
    }

    fn batch(&self) -> Option<&dyn BatchMutator<Gd = GdItem>> {
        Some(self)
    }
}
