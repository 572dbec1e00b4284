//! Typed references for the polymorphic relation graph.
//!
//! # Responsibility
//! - Define the closed set of entity types the graph can link.
//! - Provide the `(type, id)` reference pair used as edge endpoints.
//!
//! # Invariants
//! - `ItemType` string forms are part of the storage schema; renaming a
//!   variant requires a migration.

use super::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Entity types addressable by the relation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Note,
    Notebook,
    Tag,
    Color,
    Reminder,
    Monograph,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Notebook => "notebook",
            Self::Tag => "tag",
            Self::Color => "color",
            Self::Reminder => "reminder",
            Self::Monograph => "monograph",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "note" => Some(Self::Note),
            "notebook" => Some(Self::Notebook),
            "tag" => Some(Self::Tag),
            "color" => Some(Self::Color),
            "reminder" => Some(Self::Reminder),
            "monograph" => Some(Self::Monograph),
            _ => None,
        }
    }
}

impl Display for ItemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed reference to one entity, usable as either edge endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub id: ItemId,
}

impl ItemRef {
    pub fn new(kind: ItemType, id: ItemId) -> Self {
        Self { kind, id }
    }
}

impl Display for ItemRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// One directed edge in the relation graph.
///
/// Edges carry `date_created` as their only ordering key. There is no
/// explicit order column, so manual reordering of related items is
/// delete-then-re-add; see `relation::RelationGraph` for the documented
/// limitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub from: ItemRef,
    pub to: ItemRef,
    pub date_created: i64,
}
