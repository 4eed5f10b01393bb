//! # nitrus-furniture
//!
//! Furniture adapter for the nitrus reconciliation engine.
//!
//! Furniture lives in three places at once: emulator database rows
//! (`items_base` or `furniture`, depending on the back-end), the
//! `FurnitureData.json` catalog, and asset bundles under a storage
//! prefix. This crate teaches the engine how to load, key, compare, and
//! repair them:
//!
//! - [`ServerProfile`]: logical-to-physical column mappings per emulator
//! - [`FurnitureAdapter`]: the [`nitrus_core::reconcile::Adapter`]
//!   implementation, including the classname↔ID resolution that aligns
//!   storage filenames with catalog IDs
//! - Mutations: purge (delete from every store) and sync (rewrite DB
//!   fields from the catalog), each with batch fast paths
//!
//! The catalog's classname doubles as the storage filename stem, so the
//! storage index can only be keyed after the catalog is parsed; the
//! adapter sequences the two loads internally and the engine stays
//! oblivious.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

mod adapter;
mod gamedata;
mod mutations;
mod mutations_batch;
mod prepare;
mod profile;

pub use adapter::{DbItem, FurnitureAdapter, MutationContext};
pub use gamedata::{FurnitureData, GdItem, ItemKind};
pub use profile::{LogicalColumn, ServerProfile};
