//! One-shot schema preparation before sync-bearing runs.
//!
//! Gamedata names routinely exceed the 56-70 character columns the stock
//! emulator schemas ship with; syncing into them would truncate or fail.
//! Preparation widens both name columns to `VARCHAR(120)` ahead of time.

use nitrus_core::db::{DatabaseBackend, SqlDialect};
use nitrus_core::error::Result;

use crate::profile::{LogicalColumn, ServerProfile};

/// Widens `item_name` and `public_name` to `VARCHAR(120)`.
///
/// Idempotent: re-running against an already-widened schema is a no-op
/// change. Width-reducing or type-changing migrations are out of scope.
///
/// On `SQLite` there is nothing to widen - TEXT columns are
/// unconstrained - so the call succeeds without touching the schema.
pub(crate) async fn widen_name_columns(
    db: &dyn DatabaseBackend,
    profile: &ServerProfile,
) -> Result<()> {
    match db.dialect() {
        SqlDialect::MySql => {
            for field in [LogicalColumn::ItemName, LogicalColumn::PublicName] {
                let Some(column) = profile.column(field) else {
                    continue;
                };
                db.execute(
                    &format!(
                        "ALTER TABLE {} MODIFY COLUMN {} VARCHAR(120)",
                        profile.table, column
                    ),
                    vec![],
                )
                .await?;
                tracing::debug!(table = profile.table, column, "widened name column");
            }
        }
        SqlDialect::Sqlite => {
            tracing::debug!(
                table = profile.table,
                "sqlite text columns are unconstrained, nothing to widen"
            );
        }
    }
    Ok(())
}
