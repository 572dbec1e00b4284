//! Tag and color rows, stored as one keyword table.
//!
//! Tags and colors share the same shape (an id and a title) and the same
//! lifecycle: linked to notes through relation edges, get-or-created by
//! title, and prunable once nothing references them.

use super::ItemId;
use crate::model::ItemType;
use serde::{Deserialize, Serialize};

/// Discriminates the two keyword families sharing the `keywords` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordKind {
    Tag,
    Color,
}

impl KeywordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Color => "color",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tag" => Some(Self::Tag),
            "color" => Some(Self::Color),
            _ => None,
        }
    }

    pub fn item_type(self) -> ItemType {
        match self {
            Self::Tag => ItemType::Tag,
            Self::Color => ItemType::Color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: ItemId,
    pub kind: KeywordKind,
    /// Normalized title: trimmed, and lowercased for tags.
    pub title: String,
    pub date_created: i64,
    pub date_modified: i64,
}

/// Normalizes one keyword title. Returns `None` for blank input.
pub fn normalize_title(kind: KeywordKind, title: &str) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match kind {
        KeywordKind::Tag => trimmed.to_lowercase(),
        KeywordKind::Color => trimmed.to_string(),
    })
}
