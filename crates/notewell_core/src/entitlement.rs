//! Plan entitlement boundary.
//!
//! The engine gates a handful of operations behind an external predicate; it
//! implements no billing logic of its own. The check is synchronous here —
//! callers with an async billing backend answer from a cached snapshot.

use std::fmt::{Display, Formatter};

/// Plan-gated capabilities the engine asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    /// More than [`FREE_TAGS_PER_NOTE`] distinct tags on one note.
    ExtraTags,
    /// Assigning a color to a note.
    NoteColors,
    /// Creating or enabling repeating reminders.
    RecurringReminders,
}

/// Distinct tags a note may carry without the `ExtraTags` entitlement.
pub const FREE_TAGS_PER_NOTE: usize = 5;

impl Display for Entitlement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExtraTags => "extra_tags",
            Self::NoteColors => "note_colors",
            Self::RecurringReminders => "recurring_reminders",
        };
        f.write_str(name)
    }
}

pub trait EntitlementChecker {
    fn is_allowed(&self, entitlement: Entitlement) -> bool;
}

/// Grants everything. The default for tests and unmetered deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl EntitlementChecker for AllowAll {
    fn is_allowed(&self, _entitlement: Entitlement) -> bool {
        true
    }
}

/// Denies everything plan-gated. Used by tests to exercise the free tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl EntitlementChecker for DenyAll {
    fn is_allowed(&self, _entitlement: Entitlement) -> bool {
        false
    }
}
