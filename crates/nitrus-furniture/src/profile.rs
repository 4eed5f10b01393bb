//! Emulator server profiles: table names and column mappings.
//!
//! Every supported emulator models furniture in one table, but the
//! physical schemas drifted apart over the years. A profile maps the
//! fixed set of *logical* fields onto the back-end's physical columns;
//! a back-end that lacks a column simply has no mapping for it, and
//! consumers skip the field rather than fail.

/// Logical furniture fields, independent of any back-end schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalColumn {
    /// Autoincrement row id.
    Id,
    /// Catalog ID. The reconciliation key - not the row id.
    SpriteId,
    /// Classname (asset filename stem).
    ItemName,
    /// Display name.
    PublicName,
    /// Floor footprint width.
    Width,
    /// Floor footprint length.
    Length,
    /// Stacking height.
    StackHeight,
    /// Whether items stack on this one.
    CanStack,
    /// Whether avatars can sit.
    CanSit,
    /// Whether avatars can walk over.
    CanWalk,
    /// Whether avatars can lie down.
    CanLay,
    /// Floor/wall discriminator (`s` floor, `i` wall; other letters
    /// sub-classify floor items).
    Kind,
    /// Interaction handler name.
    Interaction,
    /// Rarity flag.
    IsRare,
}

/// One emulator's furniture schema: table plus column dictionary.
#[derive(Debug, Clone, Copy)]
pub struct ServerProfile {
    /// Profile name (`arcturus`, `comet`, `plus`).
    pub name: &'static str,
    /// Furniture table name.
    pub table: &'static str,
    columns: &'static [(LogicalColumn, &'static str)],
}

impl ServerProfile {
    /// Physical column for a logical field, or `None` when this
    /// back-end has no such column.
    #[must_use]
    pub fn column(&self, field: LogicalColumn) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(logical, _)| *logical == field)
            .map(|(_, physical)| *physical)
    }

    /// Profile for the Arcturus Morningstar emulator.
    #[must_use]
    pub fn arcturus() -> Self {
        Self {
            name: "arcturus",
            table: "items_base",
            columns: &[
                (LogicalColumn::Id, "id"),
                (LogicalColumn::SpriteId, "sprite_id"),
                (LogicalColumn::ItemName, "item_name"),
                (LogicalColumn::PublicName, "public_name"),
                (LogicalColumn::Width, "width"),
                (LogicalColumn::Length, "length"),
                (LogicalColumn::StackHeight, "stack_height"),
                (LogicalColumn::CanStack, "allow_stack"),
                (LogicalColumn::CanSit, "allow_sit"),
                (LogicalColumn::CanWalk, "allow_walk"),
                (LogicalColumn::CanLay, "allow_lay"),
                (LogicalColumn::Kind, "type"),
                (LogicalColumn::Interaction, "interaction_type"),
            ],
        }
    }

    /// Profile for the Comet emulator.
    #[must_use]
    pub fn comet() -> Self {
        Self {
            name: "comet",
            table: "furniture",
            columns: &[
                (LogicalColumn::Id, "id"),
                (LogicalColumn::SpriteId, "sprite_id"),
                (LogicalColumn::ItemName, "item_name"),
                (LogicalColumn::PublicName, "public_name"),
                (LogicalColumn::Width, "width"),
                (LogicalColumn::Length, "length"),
                (LogicalColumn::StackHeight, "stack_height"),
                (LogicalColumn::CanStack, "can_stack"),
                (LogicalColumn::CanSit, "can_sit"),
                (LogicalColumn::CanWalk, "is_walkable"),
                (LogicalColumn::CanLay, "can_lay"),
                (LogicalColumn::Kind, "type"),
                (LogicalColumn::Interaction, "interaction_type"),
            ],
        }
    }

    /// Profile for the Plus emulator.
    ///
    /// Plus has no lay column; the logical field stays unmapped.
    #[must_use]
    pub fn plus() -> Self {
        Self {
            name: "plus",
            table: "furniture",
            columns: &[
                (LogicalColumn::Id, "id"),
                (LogicalColumn::SpriteId, "sprite_id"),
                (LogicalColumn::ItemName, "item_name"),
                (LogicalColumn::PublicName, "public_name"),
                (LogicalColumn::Width, "width"),
                (LogicalColumn::Length, "length"),
                (LogicalColumn::StackHeight, "stack_height"),
                (LogicalColumn::CanStack, "can_stack"),
                (LogicalColumn::CanSit, "can_sit"),
                (LogicalColumn::CanWalk, "is_walkable"),
                (LogicalColumn::Kind, "type"),
                (LogicalColumn::Interaction, "interaction_type"),
                (LogicalColumn::IsRare, "is_rare"),
            ],
        }
    }

    /// Looks up a profile by emulator name.
    ///
    /// Unknown names fall back to arcturus, the default back-end.
    #[must_use]
    pub fn by_name(emulator: &str) -> Self {
        match emulator {
            "comet" => Self::comet(),
            "plus" => Self::plus(),
            _ => Self::arcturus(),
        }
    }
}
