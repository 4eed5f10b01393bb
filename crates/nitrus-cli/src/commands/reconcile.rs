//! Reconcile command - full reconciliation with optional purge/sync.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

use nitrus_core::reconcile::{Adapter, Engine, ReconcileOptions, ReconcilePlan};
use nitrus_furniture::{FurnitureAdapter, GdItem, MutationContext};

use crate::{Config, OutputFormat};

/// How many planned actions the text report lists before eliding.
const ACTION_SAMPLE: usize = 5;

/// Arguments for the reconcile command.
#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Delete items missing in any store.
    #[arg(long)]
    pub purge: bool,

    /// Update database fields from gamedata for mismatched items.
    #[arg(long)]
    pub sync: bool,

    /// Plan only; never execute, even with --yes.
    #[arg(long)]
    pub dry_run: bool,

    /// Auto-confirm destructive actions (non-interactive).
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Cache TTL in seconds for built indices (0 disables caching).
    #[arg(long, default_value = "0")]
    pub cache_ttl_secs: u64,

    /// Sync batch worker count override.
    #[arg(long)]
    pub sync_workers: Option<usize>,
}

/// Execute the reconcile command.
///
/// # Errors
///
/// Returns an error when a backend cannot be opened, an index load
/// fails, or applying the plan aborts.
pub async fn execute(args: ReconcileArgs, config: &Config) -> Result<()> {
    let (db, storage) = super::open_backends(config)?;
    let mutating = args.purge || args.sync;

    let adapter = if mutating {
        let mut context = MutationContext::new(
            db.clone(),
            Arc::clone(&storage),
            config.prefix.clone(),
            config.extension.clone(),
            config.profile.clone(),
            config.gamedata_object.clone(),
        );
        if let Some(workers) = args.sync_workers {
            context = context.with_sync_workers(workers);
        }
        FurnitureAdapter::with_mutations(context)
    } else {
        FurnitureAdapter::new()
    };

    // Widen name columns ahead of sync writes.
    if args.sync {
        if let Some(db) = db.as_deref() {
            adapter
                .prepare(db, &config.profile)
                .await
                .context("failed to prepare schema")?;
        }
    }

    let engine = Engine::new(
        Arc::new(adapter),
        super::build_spec(config, args.cache_ttl_secs),
        db,
        storage,
    );

    let mut opts = ReconcileOptions {
        do_purge: args.purge,
        do_sync: args.sync,
        dry_run: args.dry_run,
        confirmed: false,
    };

    let plan = engine
        .reconcile_with_plan(opts)
        .await
        .context("failed to plan reconciliation")?;

    print_report(&plan, &config.format)?;

    if !mutating {
        println!();
        println!(
            "No actions requested. Use --purge to delete incomplete items or --sync to repair mismatches."
        );
        return Ok(());
    }

    if args.dry_run {
        println!();
        println!("Dry-run mode: no changes were made.");
        return Ok(());
    }

    if plan.actions.is_empty() {
        println!();
        println!("No actions required.");
        return Ok(());
    }

    if !args.yes && !confirm(plan.actions.len())? {
        println!("Cancelled. No changes were made.");
        return Ok(());
    }
    opts.confirmed = true;

    match engine.apply_plan(&plan, opts).await {
        Ok(executed) => {
            println!();
            println!("Executed {executed} action(s).");
            Ok(())
        }
        Err(err) => {
            println!();
            println!("Aborted after {} action(s).", err.executed);
            Err(err).context("failed to apply plan")
        }
    }
}

fn print_report(plan: &ReconcilePlan<GdItem>, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(plan).context("failed to serialize plan")?
            );
        }
        OutputFormat::Text => {
            let s = &plan.summary;
            println!("Reconciliation report");
            println!();
            println!("  Total items:      {}", s.total_items);
            println!("  Missing gamedata: {}", s.missing_gamedata);
            println!("  Missing storage:  {}", s.missing_storage);
            println!("  Missing database: {}", s.missing_db);
            println!("  Mismatches:       {}", s.mismatches);

            if !plan.actions.is_empty() {
                println!();
                println!(
                    "Planned actions: {} ({} purge, {} sync)",
                    plan.actions.len(),
                    s.purge_actions,
                    s.sync_actions
                );
                for action in plan.actions.iter().take(ACTION_SAMPLE) {
                    println!("  {} {} ({})", action.kind, action.key, action.reason);
                }
                if plan.actions.len() > ACTION_SAMPLE {
                    println!("  ... and {} more", plan.actions.len() - ACTION_SAMPLE);
                }
            }
        }
    }
    Ok(())
}

/// Interactive confirmation gate for destructive runs.
fn confirm(actions: usize) -> Result<bool> {
    use std::io::{BufRead, Write};

    print!("About to execute {actions} action(s). This cannot be undone. Continue? [yes/no]: ");
    std::io::stdout().flush().context("failed to flush stdout")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read confirmation")?;

    let answer = line.trim();
    Ok(answer.eq_ignore_ascii_case("yes") || answer.eq_ignore_ascii_case("y"))
}
