//! The `FurnitureData.json` wire model.
//!
//! The catalog is one JSON document with two sibling sections, floor and
//! wall, each holding a `furnitype` array. The floor/wall discriminator
//! is not on the wire - it is implied by which section an item sits in
//! and injected during parsing.
//!
//! The document is also *rewritten* during gamedata purges, so every
//! struct carries a flattened extras map: fields this tool doesn't model
//! survive read-modify-write cycles untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use nitrus_core::error::{Error, Result};

/// Floor/wall discriminator for a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemKind {
    /// Floor-placed item (`s`; back-ends may sub-classify with other
    /// letters).
    #[default]
    Floor,
    /// Wall-hung item (`i`).
    Wall,
}

impl ItemKind {
    /// The discriminator letter back-ends store.
    #[must_use]
    pub fn letter(self) -> &'static str {
        match self {
            Self::Floor => "s",
            Self::Wall => "i",
        }
    }

    /// Whether this is a wall item.
    #[must_use]
    pub fn is_wall(self) -> bool {
        self == Self::Wall
    }
}

/// One catalog furniture entry.
///
/// Only the comparable fields are modeled; everything else rides in
/// `extra` and round-trips verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GdItem {
    /// Catalog ID. Matches the database's `sprite_id`.
    #[serde(default)]
    pub id: i64,

    /// Asset classname; doubles as the storage filename stem.
    #[serde(default)]
    pub classname: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Floor footprint width.
    #[serde(default)]
    pub xdim: i64,

    /// Floor footprint length.
    #[serde(default)]
    pub ydim: i64,

    /// Whether avatars can sit.
    #[serde(default)]
    pub cansiton: bool,

    /// Whether avatars can stand.
    #[serde(default)]
    pub canstandon: bool,

    /// Whether avatars can lie down.
    #[serde(default)]
    pub canlayon: bool,

    /// Section-derived discriminator; never serialized.
    #[serde(skip)]
    pub kind: ItemKind,

    /// Unmodeled wire fields, preserved across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One catalog section (`roomitemtypes` or `wallitemtypes`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FurniSection {
    /// The section's entries.
    #[serde(default)]
    pub furnitype: Vec<GdItem>,

    /// Unmodeled section-level fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The full catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FurnitureData {
    /// Floor items.
    #[serde(default)]
    pub roomitemtypes: FurniSection,

    /// Wall items.
    #[serde(default)]
    pub wallitemtypes: FurniSection,

    /// Unmodeled document-level fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FurnitureData {
    /// Parses the document from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the document is not valid
    /// JSON of the expected shape.
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|err| Error::serialization(format!("invalid furniture data: {err}")))
    }

    /// Serializes the document back to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|err| Error::serialization(format!("failed to encode furniture data: {err}")))
    }

    /// Removes every entry whose ID is in `ids`, from both sections.
    /// Returns how many entries were dropped.
    pub fn remove_ids(&mut self, ids: &HashSet<i64>) -> usize {
        let mut removed = 0;
        for section in [&mut self.roomitemtypes, &mut self.wallitemtypes] {
            let before = section.furnitype.len();
            section.furnitype.retain(|item| !ids.contains(&item.id));
            removed += before - section.furnitype.len();
        }
        removed
    }
}
