//! # nitrus-core
//!
//! Core abstractions for the nitrus asset reconciliation toolkit.
//!
//! This crate provides the foundational types and traits used across all
//! nitrus components:
//!
//! - **Storage Backend**: Abstract object-storage contract plus in-memory
//!   and local-filesystem implementations
//! - **Database Backend**: Abstract SQL contract with tolerant value
//!   coercion, plus a SQLite implementation
//! - **Reconcile Engine**: Generic three-source reconciliation, index
//!   caching, and the plan/apply mutation pipeline
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured logging initialization and spans
//!
//! ## Crate Boundary
//!
//! `nitrus-core` knows nothing about furniture or any other concrete asset
//! model. Model-specific behavior enters through the [`reconcile::Adapter`]
//! trait; `nitrus-furniture` supplies the only shipped implementation.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod db;
pub mod error;
pub mod observability;
pub mod reconcile;
pub mod storage;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use nitrus_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::db::{DatabaseBackend, SqlDialect, SqlRow, SqlValue, SqliteBackend};
    pub use crate::error::{Error, Result};
    pub use crate::reconcile::{
        Action, ActionKind, Adapter, BatchMutator, Engine, Mutator, PlanSummary, Query,
        ReconcileOptions, ReconcilePlan, ReconcileResult, ReconcileSpec,
    };
    pub use crate::storage::{FsBackend, MemoryBackend, ObjectMeta, StorageBackend};
}

// Re-export key types at crate root for ergonomics
pub use db::{DatabaseBackend, SqlDialect, SqlRow, SqlValue, SqliteBackend};
pub use error::{Error, Result};
pub use observability::{LogFormat, init_logging};
pub use storage::{FsBackend, MemoryBackend, ObjectMeta, StorageBackend};
