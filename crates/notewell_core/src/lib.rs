//! Local data engine for a note-taking app.
//! This crate is the single source of truth for storage and sync invariants.

pub mod codec;
pub mod collection;
pub mod conflict;
pub mod db;
pub mod entitlement;
pub mod grouping;
pub mod logging;
pub mod lookup;
pub mod model;
pub mod recur;
pub mod relation;
pub mod sync;

pub use codec::{ContentCodec, DecodedContent, DecryptionError, PlainCodec};
pub use collection::{
    Keywords, Monographs, Notebooks, Notes, Reminders, StoreError, StoreResult, Trash, TrashItem,
};
pub use conflict::{Conflicts, MergeOutcome, CONFLICT_THRESHOLD_MS};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use entitlement::{AllowAll, DenyAll, Entitlement, EntitlementChecker, FREE_TAGS_PER_NOTE};
pub use grouping::{GroupBy, GroupOptions, GroupSlot, Groupable, GroupedView, SortBy, SortDirection};
pub use logging::{default_log_level, init_logging, logging_status};
pub use lookup::lookup;
pub use model::{
    DraftContent, ItemId, ItemRef, ItemType, Keyword, KeywordKind, Monograph, MonographOptions,
    Note, Notebook, NotebookPatch, NotePatch, Patch, RecurringMode, Relation, Reminder,
    ReminderMode, ReminderPatch, ValidationError,
};
pub use relation::{Endpoint, RelationGraph};
pub use sync::{
    MergeReport, Merger, PushOutcome, RemoteItem, SyncError, SyncKind, SyncReport, SyncResult,
    SyncTransport, TransportError,
};

/// Returns the engine crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
