//! Notebook model and patch input.
//!
//! Nesting is expressed through notebook-contains-notebook relation edges,
//! not a parent pointer; a notebook row carries no hierarchy state.

use super::{ItemId, Patch};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub pinned: bool,
    pub date_created: i64,
    pub date_modified: i64,
}

/// Field-level patch for `Notebooks::add`.
#[derive(Debug, Clone, Default)]
pub struct NotebookPatch {
    pub id: Option<ItemId>,
    pub title: Option<String>,
    pub description: Patch<String>,
    pub pinned: Option<bool>,
}

impl NotebookPatch {
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}
