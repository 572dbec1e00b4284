//! Domain model for the note engine.
//!
//! # Responsibility
//! - Define the canonical records persisted by the storage backend.
//! - Provide validation and the explicit field-patch representation used by
//!   collection `add` semantics.
//!
//! # Invariants
//! - Every item is identified by a stable `ItemId` that is never reused.
//! - Deletion of notes/notebooks is represented by soft-delete tombstones
//!   (the Trash); hard delete happens only on purge.
//! - All timestamps are unix epoch milliseconds.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod monograph;
pub mod note;
pub mod notebook;
pub mod relation;
pub mod reminder;
pub mod tag;

pub use monograph::{Monograph, MonographOptions};
pub use note::{DraftContent, Note, NotePatch};
pub use notebook::{Notebook, NotebookPatch};
pub use relation::{ItemRef, ItemType, Relation};
pub use reminder::{RecurringMode, Reminder, ReminderMode, ReminderPatch};
pub use tag::{Keyword, KeywordKind};

/// Stable identifier shared by every entity type.
pub type ItemId = Uuid;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Three-state field patch: leave unchanged, set a value, or clear it.
///
/// Collection `add` treats an omitted field as "keep" — clearing a stored
/// value always requires the explicit `Clear` sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    /// Applies this patch on top of the currently stored value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Self::Keep => current,
            Self::Set(value) => Some(value),
            Self::Clear => None,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

/// Structural validation failure for a mutation input.
///
/// Validation always fails before any row is written, so a `Validation`
/// error implies no partial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required title is empty or whitespace-only.
    EmptyTitle(ItemType),
    /// A brand new note carried neither title nor content.
    EmptyNote,
    /// A repeating reminder is missing its recurring mode.
    MissingRecurringMode,
    /// A selected day is outside the valid range for the recurring mode.
    InvalidSelectedDay { mode: RecurringMode, day: u32 },
    /// Linking the notebook would create a nesting cycle.
    NotebookCycle { parent: ItemId, child: ItemId },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle(kind) => write!(f, "{kind} title cannot be empty"),
            Self::EmptyNote => write!(f, "a new note needs a title or content"),
            Self::MissingRecurringMode => {
                write!(f, "repeating reminders require a recurring mode")
            }
            Self::InvalidSelectedDay { mode, day } => {
                write!(f, "day {day} is not valid for recurring mode {mode}")
            }
            Self::NotebookCycle { parent, child } => write!(
                f,
                "nesting notebook {child} under {parent} would create a cycle"
            ),
        }
    }
}

impl Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::Patch;

    #[test]
    fn patch_keep_preserves_current_value() {
        assert_eq!(Patch::<i32>::Keep.apply(Some(7)), Some(7));
        assert_eq!(Patch::<i32>::Keep.apply(None), None);
    }

    #[test]
    fn patch_set_and_clear_override_current_value() {
        assert_eq!(Patch::Set(3).apply(Some(7)), Some(3));
        assert_eq!(Patch::<i32>::Clear.apply(Some(7)), None);
    }
}
