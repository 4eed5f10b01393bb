//! Generic three-source asset reconciliation.
//!
//! This module reconciles three independent sources of truth - a database
//! table, a gamedata JSON catalog, and an object-storage prefix - and
//! reports, per item, which stores know it and whether shared fields
//! agree. It is designed for 60k-100k assets:
//!
//! - The three in-memory indices build concurrently
//! - Storage is listed in a single pass (no per-item existence calls)
//! - Database rows load through one batch query
//! - A TTL cache with stampede protection serves repeated runs
//!
//! # Architecture
//!
//! 1. **Engine** ([`Engine`]): builds the key union across sources,
//!    detects presence and field mismatches, and answers targeted
//!    single-item queries without a full scan.
//! 2. **Adapter** ([`Adapter`]): model-specific loading, key extraction,
//!    and comparison. Adapters absorb schema variation (server profiles)
//!    and catalog structure (multiple JSON paths).
//! 3. **Cache** ([`CacheRecord`]): TTL-based record store; concurrent
//!    misses for the same key coalesce into one rebuild.
//! 4. **Plan/apply** ([`ReconcilePlan`]): a read-only action plan derived
//!    from results plus options, executed only behind an explicit
//!    confirmation gate, using the adapter's batch mutations when
//!    offered.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = Engine::new(adapter, spec, Some(db), storage);
//! let results = engine.reconcile_all().await?;
//! let plan = engine.reconcile_with_plan(opts).await?;
//! let executed = engine.apply_plan(&plan, opts).await?;
//! ```

mod adapter;
mod cache;
mod engine;
mod plan;
mod types;

pub use adapter::{Adapter, BatchMutator, Mutator};
pub use cache::CacheRecord;
pub use engine::Engine;
pub use types::{
    Action, ActionKind, PlanSummary, Query, ReconcileOptions, ReconcilePlan, ReconcileResult,
    ReconcileSpec,
};

#[cfg(test)]
pub(crate) mod testutil;
