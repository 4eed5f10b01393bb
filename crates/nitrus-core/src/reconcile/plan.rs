//! Plan generation and application.
//!
//! Planning is read-only: it derives an action list from reconciliation
//! results plus options. Application is gated twice - `confirmed` must
//! be set and `dry_run` must not be - and goes through the adapter's
//! mutation capability, preferring batch methods per action kind.

use crate::error::{ApplyError, Error, Result};

use super::adapter::Adapter;
use super::cache::CacheRecord;
use super::engine::Engine;
use super::types::{Action, ActionKind, PlanSummary, ReconcileOptions, ReconcilePlan, ReconcileResult};

impl<A: Adapter> Engine<A> {
    /// Reconciles and returns a plan with results, actions, and summary.
    ///
    /// Does **not** execute anything; see [`Engine::apply_plan`].
    ///
    /// # Errors
    ///
    /// Returns the first index-load error.
    pub async fn reconcile_with_plan(
        &self,
        opts: ReconcileOptions,
    ) -> Result<ReconcilePlan<A::Gd>> {
        let record = self.record().await?;

        let mut results: Vec<ReconcileResult> = super::engine::union_keys(&record)
            .into_iter()
            .map(|key| self.build_result(&key, &record))
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));

        let (summary, actions) = build_plan_from_results(&results, &record, opts);

        Ok(ReconcilePlan {
            results,
            actions,
            summary,
        })
    }

    /// Executes the actions in a plan.
    ///
    /// Returns the number of actions executed. Nothing runs unless
    /// `opts.confirmed` is set and `opts.dry_run` is not - in that case
    /// the count is 0 and there is no error (the caller informs the
    /// user).
    ///
    /// Actions are grouped by kind. Each kind prefers the adapter's
    /// batch method when offered and falls back to per-key calls.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] if the adapter lacks the mutation
    /// capability or an action fails; the error carries how many actions
    /// executed before the abort. Executed actions are not rolled back.
    pub async fn apply_plan(
        &self,
        plan: &ReconcilePlan<A::Gd>,
        opts: ReconcileOptions,
    ) -> std::result::Result<usize, ApplyError> {
        if !opts.confirmed || opts.dry_run {
            return Ok(0);
        }

        let mutator = self.adapter().mutator().ok_or_else(|| ApplyError {
            executed: 0,
            source: Error::MutationUnsupported {
                adapter: self.adapter().name().to_string(),
            },
        })?;

        let mut delete_db_keys = Vec::new();
        let mut delete_gamedata_keys = Vec::new();
        let mut delete_storage_keys = Vec::new();
        let mut sync_actions: Vec<&Action<A::Gd>> = Vec::new();

        for action in &plan.actions {
            match action.kind {
                ActionKind::DeleteDb => delete_db_keys.push(action.key.clone()),
                ActionKind::DeleteGamedata => delete_gamedata_keys.push(action.key.clone()),
                ActionKind::DeleteStorage => delete_storage_keys.push(action.key.clone()),
                ActionKind::SyncDb => sync_actions.push(action),
            }
        }

        let mut executed = 0usize;
        let fail = |executed: usize, source: Error| ApplyError { executed, source };

        if !delete_db_keys.is_empty() {
            if let Some(batch) = mutator.batch() {
                batch
                    .delete_db_batch(&delete_db_keys)
                    .await
                    .map_err(|e| fail(executed, e))?;
                executed += delete_db_keys.len();
            } else {
                for key in &delete_db_keys {
                    mutator
                        .delete_db(key)
                        .await
                        .map_err(|e| fail(executed, e))?;
                    executed += 1;
                }
            }
        }

        if !delete_gamedata_keys.is_empty() {
            if let Some(batch) = mutator.batch() {
                batch
                    .delete_gamedata_batch(&delete_gamedata_keys)
                    .await
                    .map_err(|e| fail(executed, e))?;
                executed += delete_gamedata_keys.len();
            } else {
                for key in &delete_gamedata_keys {
                    mutator
                        .delete_gamedata(key)
                        .await
                        .map_err(|e| fail(executed, e))?;
                    executed += 1;
                }
            }
        }

        if !delete_storage_keys.is_empty() {
            if let Some(batch) = mutator.batch() {
                batch
                    .delete_storage_batch(&delete_storage_keys)
                    .await
                    .map_err(|e| fail(executed, e))?;
                executed += delete_storage_keys.len();
            } else {
                for key in &delete_storage_keys {
                    mutator
                        .delete_storage(key)
                        .await
                        .map_err(|e| fail(executed, e))?;
                    executed += 1;
                }
            }
        }

        if !sync_actions.is_empty() {
            if let Some(batch) = mutator.batch() {
                let owned: Vec<Action<A::Gd>> = sync_actions.iter().map(|a| (*a).clone()).collect();
                batch
                    .sync_db_batch(&owned)
                    .await
                    .map_err(|e| fail(executed, e))?;
                executed += owned.len();
            } else {
                for action in &sync_actions {
                    let gd_item = action.gd_item.as_ref().ok_or_else(|| {
                        fail(
                            executed,
                            Error::internal(format!(
                                "sync action for {} carries no gamedata item",
                                action.key
                            )),
                        )
                    })?;
                    mutator
                        .sync_db_from_gamedata(&action.key, gd_item)
                        .await
                        .map_err(|e| fail(executed, e))?;
                    executed += 1;
                }
            }
        }

        // After mutations the cached indices are stale by construction.
        self.invalidate_cache();

        Ok(executed)
    }

    /// Plans and, when the gate allows, applies in one call.
    ///
    /// # Errors
    ///
    /// A planning failure surfaces as [`ApplyError`] with `executed = 0`;
    /// apply failures carry their partial count.
    pub async fn reconcile_and_apply(
        &self,
        opts: ReconcileOptions,
    ) -> std::result::Result<(ReconcilePlan<A::Gd>, usize), ApplyError> {
        let plan = self
            .reconcile_with_plan(opts)
            .await
            .map_err(|source| ApplyError {
                executed: 0,
                source,
            })?;

        let executed = self.apply_plan(&plan, opts).await?;
        Ok((plan, executed))
    }
}

/// Derives the summary and action list from results.
fn build_plan_from_results<A: Adapter>(
    results: &[ReconcileResult],
    record: &CacheRecord<A>,
    opts: ReconcileOptions,
) -> (PlanSummary, Vec<Action<A::Gd>>) {
    let mut summary = PlanSummary {
        total_items: results.len(),
        ..PlanSummary::default()
    };
    let mut actions = Vec::new();

    for result in results {
        // Incomplete items, counted with OR semantics per store: an item
        // is "missing storage" when either of the other two knows it.
        if (result.db_present || result.gamedata_present) && !result.storage_present {
            summary.missing_storage += 1;
        }
        if (result.db_present || result.storage_present) && !result.gamedata_present {
            summary.missing_gamedata += 1;
        }
        if (result.gamedata_present || result.storage_present) && !result.db_present {
            summary.missing_db += 1;
        }
        if !result.mismatch.is_empty() {
            summary.mismatches += 1;
        }

        if opts.do_purge {
            let missing_somewhere =
                !result.db_present || !result.gamedata_present || !result.storage_present;
            if missing_somewhere {
                let reason = missing_reason(result);
                if result.db_present {
                    actions.push(Action {
                        kind: ActionKind::DeleteDb,
                        key: result.id.clone(),
                        reason: reason.clone(),
                        gd_item: None,
                    });
                    summary.purge_actions += 1;
                }
                if result.gamedata_present {
                    actions.push(Action {
                        kind: ActionKind::DeleteGamedata,
                        key: result.id.clone(),
                        reason: reason.clone(),
                        gd_item: None,
                    });
                    summary.purge_actions += 1;
                }
                if result.storage_present {
                    actions.push(Action {
                        kind: ActionKind::DeleteStorage,
                        key: result.id.clone(),
                        reason,
                        gd_item: None,
                    });
                    summary.purge_actions += 1;
                }
                // Purge displaces sync for this item.
                continue;
            }
        }

        if opts.do_sync
            && !result.mismatch.is_empty()
            && result.db_present
            && result.gamedata_present
        {
            let gd_item = record.gd_index.get(&result.id).cloned();
            actions.push(Action {
                kind: ActionKind::SyncDb,
                key: result.id.clone(),
                reason: format!("mismatch: {:?}", result.mismatch),
                gd_item,
            });
            summary.sync_actions += 1;
        }
    }

    (summary, actions)
}

/// Why an entity is being purged: which stores lack it.
fn missing_reason(result: &ReconcileResult) -> String {
    let mut missing = Vec::new();
    if !result.gamedata_present {
        missing.push("gamedata");
    }
    if !result.storage_present {
        missing.push("storage");
    }
    if !result.db_present {
        missing.push("database");
    }

    if missing.is_empty() {
        "complete".to_string()
    } else {
        format!("missing in: {missing:?}")
    }
}
