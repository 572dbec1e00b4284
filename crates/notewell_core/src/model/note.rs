//! Note read model and field-level patch input.
//!
//! # Responsibility
//! - Define the note metadata row and its patch shape.
//! - Keep the denormalized tag/notebook lists alongside the relation edges
//!   that are their source of truth.
//!
//! # Invariants
//! - `content_id` points at the single content row owned by this note, or is
//!   absent for a metadata-only note.
//! - `date_edited` advances only on title/content edits; `date_modified`
//!   advances on every write.
//! - `conflicted` is set exactly while the owned content row holds a second,
//!   unresolved payload.

use super::{ItemId, Patch};
use serde::{Deserialize, Serialize};

/// Note metadata as stored. The body lives in a separate content row and is
/// opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: ItemId,
    pub title: String,
    /// Short plaintext preview derived at write time; absent when the body
    /// was never offered in plaintext (e.g. locked notes).
    pub excerpt: Option<String>,
    pub content_id: Option<ItemId>,
    /// Denormalized lowercase tag titles, mirrored from tag relation edges.
    pub tags: Vec<String>,
    /// Denormalized notebook ids, mirrored from notebook relation edges.
    pub notebooks: Vec<ItemId>,
    /// Color title, mirrored from the color relation edge.
    pub color: Option<String>,
    pub pinned: bool,
    pub favorite: bool,
    pub readonly: bool,
    pub local_only: bool,
    pub conflicted: bool,
    pub date_created: i64,
    pub date_modified: i64,
    pub date_edited: i64,
    /// Monotonic edit stamp used by the sync merge path.
    pub session_id: i64,
}

/// Plaintext body handed to the engine for encoding; the engine persists
/// only the codec output and the derived excerpt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftContent {
    /// Content type tag, passed through to the codec (e.g. `tiptap`).
    pub kind: String,
    pub text: String,
}

impl DraftContent {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }
}

/// Field-level patch for `Notes::add`.
///
/// Omitted (`None` / `Patch::Keep`) fields leave stored state unchanged.
/// Tags, notebooks and color are not patched here; they are maintained by
/// the dedicated tag/untag and notebook membership operations so the
/// relation edges and denormalized lists never diverge.
#[derive(Debug, Clone, Default)]
pub struct NotePatch {
    /// Existing id to patch; absent to create a fresh note.
    pub id: Option<ItemId>,
    pub title: Option<String>,
    pub content: Option<DraftContent>,
    pub pinned: Option<bool>,
    pub favorite: Option<bool>,
    pub readonly: Option<bool>,
    pub local_only: Option<bool>,
    /// Excerpt override for callers that cannot provide plaintext content.
    pub excerpt: Patch<String>,
    pub session_id: Option<i64>,
}

impl NotePatch {
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn for_id(id: ItemId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}
