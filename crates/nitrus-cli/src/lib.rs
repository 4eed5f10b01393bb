//! # nitrus-cli
//!
//! Command-line interface for nitrus asset reconciliation.
//!
//! ## Commands
//!
//! - `nitrus reconcile` - Reconcile furniture across database, gamedata,
//!   and storage; optionally purge orphans or sync mismatches
//! - `nitrus check` - Targeted reconciliation of a single item
//!
//! ## Configuration
//!
//! Every flag falls back to an environment variable:
//!
//! - `NITRUS_ASSET_ROOT` - Root directory of the asset tree
//! - `NITRUS_DB` - `SQLite` database file (omit for storage-only installs)
//! - `NITRUS_PROFILE` - Emulator profile (`arcturus`, `comet`, `plus`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nitrus - asset reconciliation command-line interface.
#[derive(Debug, Parser)]
#[command(name = "nitrus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory of the asset tree (bundles + gamedata).
    #[arg(long, env = "NITRUS_ASSET_ROOT")]
    pub asset_root: PathBuf,

    /// SQLite database file. Omit for storage-only installs.
    #[arg(long, env = "NITRUS_DB")]
    pub db: Option<PathBuf>,

    /// Emulator profile.
    #[arg(long, env = "NITRUS_PROFILE", default_value = "arcturus")]
    pub profile: String,

    /// Storage prefix for furniture bundles.
    #[arg(long, env = "NITRUS_PREFIX", default_value = "bundled/furniture")]
    pub prefix: String,

    /// Bundle file extension.
    #[arg(long, env = "NITRUS_EXTENSION", default_value = ".nitro")]
    pub extension: String,

    /// Object key of the gamedata document.
    #[arg(
        long,
        env = "NITRUS_GAMEDATA_OBJECT",
        default_value = "gamedata/FurnitureData.json"
    )]
    pub gamedata_object: String,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            asset_root: self.asset_root.clone(),
            db: self.db.clone(),
            profile: self.profile.clone(),
            prefix: self.prefix.clone(),
            extension: self.extension.clone(),
            gamedata_object: self.gamedata_object.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile furniture assets (report + optionally purge/sync).
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Check a single furniture item across all three sources.
    Check(commands::check::CheckArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the asset tree.
    pub asset_root: PathBuf,
    /// SQLite database file, when the install has one.
    pub db: Option<PathBuf>,
    /// Emulator profile name.
    pub profile: String,
    /// Storage prefix for bundles.
    pub prefix: String,
    /// Bundle file extension.
    pub extension: String,
    /// Object key of the gamedata document.
    pub gamedata_object: String,
    /// Output format.
    pub format: OutputFormat,
}
