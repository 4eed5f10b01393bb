//! Check command - targeted reconciliation of a single item.

use anyhow::{Context, Result, bail};
use clap::Args;
use std::sync::Arc;

use nitrus_core::reconcile::{Engine, Query};
use nitrus_furniture::FurnitureAdapter;

use crate::{Config, OutputFormat};

/// Arguments for the check command.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Furniture ID (the catalog/sprite id).
    #[arg(long)]
    pub id: Option<String>,

    /// Classname to look up.
    #[arg(long)]
    pub classname: Option<String>,

    /// Display name to look up.
    #[arg(long)]
    pub name: Option<String>,
}

/// Execute the check command.
///
/// # Errors
///
/// Returns an error when no selector was given, a backend cannot be
/// opened, or a lookup fails.
pub async fn execute(args: CheckArgs, config: &Config) -> Result<()> {
    if args.id.is_none() && args.classname.is_none() && args.name.is_none() {
        bail!("pass at least one of --id, --classname, or --name");
    }

    let (db, storage) = super::open_backends(config)?;
    let engine = Engine::new(
        Arc::new(FurnitureAdapter::new()),
        super::build_spec(config, 0),
        db,
        storage,
    );

    let query = Query {
        id: args.id,
        classname: args.classname,
        name: args.name,
    };
    let result = engine
        .reconcile_one(&query)
        .await
        .context("failed to check item")?;

    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("failed to serialize result")?
            );
        }
        OutputFormat::Text => {
            let found = result.db_present || result.gamedata_present || result.storage_present;
            if !found {
                println!("Not found in any source.");
                return Ok(());
            }

            println!("Item {}", result.id);
            if !result.name.is_empty() {
                println!("  Name:      {}", result.name);
            }
            if let Some(classname) = result.metadata.get("classname") {
                println!("  Classname: {classname}");
            }
            println!("  Database:  {}", present(result.db_present));
            println!("  Gamedata:  {}", present(result.gamedata_present));
            println!("  Storage:   {}", present(result.storage_present));

            if !result.mismatch.is_empty() {
                println!("  Mismatches:");
                for mismatch in &result.mismatch {
                    println!("    - {mismatch}");
                }
            }
        }
    }

    Ok(())
}

fn present(flag: bool) -> &'static str {
    if flag { "present" } else { "MISSING" }
}
