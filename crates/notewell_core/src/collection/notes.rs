//! Notes collection: CRUD with field-level patch semantics, duplication,
//! tagging and coloring.
//!
//! # Responsibility
//! - Own the `notes` table and the content rows notes reference.
//! - Keep denormalized tag/notebook/color state in lockstep with relation
//!   edges, inside one transaction per mutation.
//!
//! # Invariants
//! - `add` never clears a field the patch does not mention.
//! - Note bodies pass through the content codec; the engine persists opaque
//!   bytes plus a plaintext excerpt derived before encoding.
//! - `remove` soft-deletes to the Trash and is idempotent.

use crate::codec::{ContentCodec, DecodedContent};
use crate::collection::keywords::{self, Keywords};
use crate::collection::{
    bool_to_int, decode_string_list, encode_string_list, get_bool, get_id, StoreError, StoreResult,
};
use crate::entitlement::{Entitlement, EntitlementChecker, FREE_TAGS_PER_NOTE};
use crate::model::{
    now_ms, ItemId, ItemRef, ItemType, KeywordKind, Note, NotePatch, ValidationError,
};
use crate::relation::RelationGraph;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use uuid::Uuid;

const EXCERPT_MAX_CHARS: usize = 150;
const COPY_SUFFIX: &str = " (Copy)";

static MARKUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[*_`#>~\[\]()!]+").expect("valid markup regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

pub(crate) const NOTE_SELECT_SQL: &str = "SELECT
    id,
    title,
    excerpt,
    content_id,
    tags,
    notebooks,
    color,
    pinned,
    favorite,
    readonly,
    local_only,
    conflicted,
    date_created,
    date_modified,
    date_edited,
    session_id
FROM notes";

/// Notes collection facade over one connection.
pub struct Notes<'a> {
    conn: &'a mut Connection,
    codec: &'a dyn ContentCodec,
    entitlements: &'a dyn EntitlementChecker,
}

impl<'a> Notes<'a> {
    pub fn new(
        conn: &'a mut Connection,
        codec: &'a dyn ContentCodec,
        entitlements: &'a dyn EntitlementChecker,
    ) -> Self {
        Self {
            conn,
            codec,
            entitlements,
        }
    }

    /// Creates a note or applies a field-level patch to an existing one.
    ///
    /// # Contract
    /// - A fresh note needs a title or content.
    /// - Omitted fields keep their stored value; repeating an identical
    ///   payload yields identical state.
    /// - Returns the note id.
    pub fn add(&mut self, patch: NotePatch) -> StoreResult<ItemId> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle(ItemType::Note).into());
            }
        }

        let id = patch.id.unwrap_or_else(Uuid::new_v4);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = note_by_id(&tx, id, false)?;
        if existing.is_none() && patch.title.is_none() && patch.content.is_none() {
            return Err(ValidationError::EmptyNote.into());
        }

        let now = now_ms();
        let mut note = existing.clone().unwrap_or(Note {
            id,
            title: String::new(),
            excerpt: None,
            content_id: None,
            tags: Vec::new(),
            notebooks: Vec::new(),
            color: None,
            pinned: false,
            favorite: false,
            readonly: false,
            local_only: false,
            conflicted: false,
            date_created: now,
            date_modified: now,
            date_edited: now,
            session_id: 0,
        });

        let mut edited = false;
        if let Some(title) = patch.title {
            if note.title != title {
                edited = true;
            }
            note.title = title;
        }

        if let Some(draft) = patch.content {
            let data = self.codec.encode(&draft.kind, &draft.text)?;
            let content_id = note.content_id.unwrap_or_else(Uuid::new_v4);
            let session_id = patch.session_id.unwrap_or(note.session_id + 1);
            tx.execute(
                "INSERT INTO content (id, note_id, kind, data, date_modified, session_id, local_only, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    data = excluded.data,
                    date_modified = excluded.date_modified,
                    session_id = excluded.session_id,
                    synced = 0;",
                params![
                    content_id.to_string(),
                    id.to_string(),
                    draft.kind,
                    data,
                    now,
                    session_id,
                    bool_to_int(note.local_only),
                ],
            )?;
            note.content_id = Some(content_id);
            note.excerpt = derive_excerpt(&draft.text);
            edited = true;
        }

        if let Some(pinned) = patch.pinned {
            note.pinned = pinned;
        }
        if let Some(favorite) = patch.favorite {
            note.favorite = favorite;
        }
        if let Some(readonly) = patch.readonly {
            note.readonly = readonly;
        }
        if let Some(local_only) = patch.local_only {
            note.local_only = local_only;
            if let Some(content_id) = note.content_id {
                tx.execute(
                    "UPDATE content SET local_only = ?2 WHERE id = ?1;",
                    params![content_id.to_string(), bool_to_int(local_only)],
                )?;
            }
        }
        if !patch.excerpt.is_keep() {
            note.excerpt = patch.excerpt.apply(note.excerpt);
        }

        note.date_modified = now;
        if edited {
            note.date_edited = now;
        }
        note.session_id = patch.session_id.unwrap_or(note.session_id + 1);

        upsert_note_row(&tx, &note, false, None)?;
        tx.commit()?;
        debug!(
            "event=note_add module=collection status=ok id={id} created={}",
            existing.is_none()
        );
        Ok(id)
    }

    /// Gets one active (non-trashed) note.
    pub fn note(&self, id: ItemId) -> StoreResult<Option<Note>> {
        note_by_id(self.conn, id, false)
    }

    /// Lists all active notes sorted by last modification.
    pub fn all(&self) -> StoreResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL} WHERE deleted = 0 ORDER BY date_modified DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    /// Decodes the note's body through the codec.
    ///
    /// A codec failure is fatal for this note only; callers listing many
    /// notes render the item unavailable instead of aborting.
    pub fn content(&self, note_id: ItemId) -> StoreResult<Option<DecodedContent>> {
        let Some(note) = note_by_id(self.conn, note_id, true)? else {
            return Ok(None);
        };
        let Some(content_id) = note.content_id else {
            return Ok(None);
        };
        let data: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT data FROM content WHERE id = ?1;",
                [content_id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match data {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Soft-deletes notes to the Trash. Missing ids are no-ops.
    pub fn remove(&mut self, ids: &[ItemId]) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_ms();
        for id in ids {
            tx.execute(
                "UPDATE notes
                 SET deleted = 1, date_deleted = ?2, date_modified = ?2
                 WHERE id = ?1 AND deleted = 0;",
                params![id.to_string(), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Clones a note's content and metadata under fresh ids.
    ///
    /// The copy drops pinned/favorite/readonly, gets fresh dates and a
    /// suffixed title; tag/color/notebook links are carried over.
    pub fn duplicate(&mut self, id: ItemId) -> StoreResult<ItemId> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let source = note_by_id(&tx, id, false)?.ok_or(StoreError::NotFound {
            kind: ItemType::Note,
            id,
        })?;

        let now = now_ms();
        let new_id = Uuid::new_v4();
        let new_content_id = match source.content_id {
            Some(content_id) => {
                let fresh = Uuid::new_v4();
                tx.execute(
                    "INSERT INTO content (id, note_id, kind, data, date_modified, session_id, local_only, synced)
                     SELECT ?2, ?3, kind, data, ?4, 0, local_only, 0
                     FROM content WHERE id = ?1;",
                    params![
                        content_id.to_string(),
                        fresh.to_string(),
                        new_id.to_string(),
                        now
                    ],
                )?;
                Some(fresh)
            }
            None => None,
        };

        let copy = Note {
            id: new_id,
            title: format!("{}{COPY_SUFFIX}", source.title),
            content_id: new_content_id,
            pinned: false,
            favorite: false,
            readonly: false,
            conflicted: false,
            date_created: now,
            date_modified: now,
            date_edited: now,
            session_id: 0,
            ..source.clone()
        };
        upsert_note_row(&tx, &copy, false, None)?;

        let graph = RelationGraph::new(&tx);
        let new_ref = ItemRef::new(ItemType::Note, new_id);
        for kind in [ItemType::Tag, ItemType::Color, ItemType::Notebook] {
            for linked in graph.to_refs(ItemRef::new(ItemType::Note, id), kind)? {
                graph.add(linked, new_ref)?;
            }
        }

        tx.commit()?;
        Ok(new_id)
    }

    /// Tags a note, get-or-creating the tag row.
    ///
    /// Going past the free distinct-tag cap requires the `ExtraTags`
    /// entitlement. Returns the tag id.
    pub fn tag(&mut self, note_id: ItemId, tag_title: &str) -> StoreResult<ItemId> {
        let Some(title) = keywords::normalized(KeywordKind::Tag, tag_title) else {
            return Err(ValidationError::EmptyTitle(ItemType::Tag).into());
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut note = note_by_id(&tx, note_id, false)?.ok_or(StoreError::NotFound {
            kind: ItemType::Note,
            id: note_id,
        })?;

        let is_new = !note.tags.contains(&title);
        if is_new
            && note.tags.len() >= FREE_TAGS_PER_NOTE
            && !self.entitlements.is_allowed(Entitlement::ExtraTags)
        {
            return Err(StoreError::EntitlementDenied(Entitlement::ExtraTags));
        }

        let tag_id = Keywords::get_or_create_in(&tx, KeywordKind::Tag, &title)?;
        RelationGraph::new(&tx).add(
            ItemRef::new(ItemType::Tag, tag_id),
            ItemRef::new(ItemType::Note, note_id),
        )?;

        if is_new {
            note.tags.push(title);
            note.date_modified = now_ms();
            upsert_note_row(&tx, &note, false, None)?;
        }
        tx.commit()?;
        Ok(tag_id)
    }

    /// Removes a tag from a note. A tag the note does not carry is a no-op.
    pub fn untag(&mut self, note_id: ItemId, tag_title: &str) -> StoreResult<()> {
        let Some(title) = keywords::normalized(KeywordKind::Tag, tag_title) else {
            return Ok(());
        };
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(mut note) = note_by_id(&tx, note_id, false)? else {
            return Ok(());
        };
        let Some(position) = note.tags.iter().position(|t| t == &title) else {
            return Ok(());
        };
        note.tags.remove(position);

        if let Some(tag_id) = Keywords::find_in(&tx, KeywordKind::Tag, &title)? {
            RelationGraph::new(&tx).unlink(
                crate::relation::Endpoint::Exact(ItemRef::new(ItemType::Tag, tag_id)),
                crate::relation::Endpoint::Exact(ItemRef::new(ItemType::Note, note_id)),
            )?;
        }

        note.date_modified = now_ms();
        upsert_note_row(&tx, &note, false, None)?;
        tx.commit()?;
        Ok(())
    }

    /// Assigns a color to a note, replacing any previous color.
    pub fn set_color(&mut self, note_id: ItemId, color_title: &str) -> StoreResult<ItemId> {
        if !self.entitlements.is_allowed(Entitlement::NoteColors) {
            return Err(StoreError::EntitlementDenied(Entitlement::NoteColors));
        }
        let Some(title) = keywords::normalized(KeywordKind::Color, color_title) else {
            return Err(ValidationError::EmptyTitle(ItemType::Color).into());
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut note = note_by_id(&tx, note_id, false)?.ok_or(StoreError::NotFound {
            kind: ItemType::Note,
            id: note_id,
        })?;

        let graph = RelationGraph::new(&tx);
        let note_ref = ItemRef::new(ItemType::Note, note_id);
        graph.unlink(
            crate::relation::Endpoint::Kind(ItemType::Color),
            crate::relation::Endpoint::Exact(note_ref),
        )?;

        let color_id = Keywords::get_or_create_in(&tx, KeywordKind::Color, &title)?;
        graph.add(ItemRef::new(ItemType::Color, color_id), note_ref)?;

        note.color = Some(title);
        note.date_modified = now_ms();
        upsert_note_row(&tx, &note, false, None)?;
        tx.commit()?;
        Ok(color_id)
    }

    /// Clears a note's color. Idempotent.
    pub fn clear_color(&mut self, note_id: ItemId) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(mut note) = note_by_id(&tx, note_id, false)? else {
            return Ok(());
        };
        if note.color.is_none() {
            return Ok(());
        }
        RelationGraph::new(&tx).unlink(
            crate::relation::Endpoint::Kind(ItemType::Color),
            crate::relation::Endpoint::Exact(ItemRef::new(ItemType::Note, note_id)),
        )?;
        note.color = None;
        note.date_modified = now_ms();
        upsert_note_row(&tx, &note, false, None)?;
        tx.commit()?;
        Ok(())
    }
}

/// Derives a plaintext excerpt from draft text: markup symbols stripped,
/// whitespace collapsed, capped at a fixed length.
pub fn derive_excerpt(text: &str) -> Option<String> {
    let without_markup = MARKUP_RE.replace_all(text, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_markup, " ");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(EXCERPT_MAX_CHARS).collect())
    }
}

/// Removes a hard-deleted notebook's id from every note's denormalized
/// list. Runs before the notebook's edges are unlinked, inside the caller's
/// transaction.
pub(crate) fn scrub_notebook_refs(conn: &Connection, notebook_id: ItemId) -> StoreResult<()> {
    let graph = RelationGraph::new(conn);
    for linked in graph.from_refs(
        ItemRef::new(ItemType::Notebook, notebook_id),
        ItemType::Note,
    )? {
        if let Some(mut note) = note_by_id(conn, linked.id, true)? {
            if let Some(position) = note.notebooks.iter().position(|id| *id == notebook_id) {
                note.notebooks.remove(position);
                note.date_modified = now_ms();
                upsert_note_row(conn, &note, false, None)?;
            }
        }
    }
    Ok(())
}

/// Removes a hard-deleted keyword's title from every note that carries it:
/// the tag list entry, or the color field. Same transaction contract as
/// [`scrub_notebook_refs`].
pub(crate) fn scrub_keyword_refs(
    conn: &Connection,
    kind: KeywordKind,
    keyword_id: ItemId,
    title: &str,
) -> StoreResult<()> {
    let graph = RelationGraph::new(conn);
    for linked in graph.from_refs(
        ItemRef::new(kind.item_type(), keyword_id),
        ItemType::Note,
    )? {
        let Some(mut note) = note_by_id(conn, linked.id, true)? else {
            continue;
        };
        let changed = match kind {
            KeywordKind::Tag => match note.tags.iter().position(|t| t == title) {
                Some(position) => {
                    note.tags.remove(position);
                    true
                }
                None => false,
            },
            KeywordKind::Color => {
                if note.color.as_deref() == Some(title) {
                    note.color = None;
                    true
                } else {
                    false
                }
            }
        };
        if changed {
            note.date_modified = now_ms();
            upsert_note_row(conn, &note, false, None)?;
        }
    }
    Ok(())
}

pub(crate) fn note_by_id(
    conn: &Connection,
    id: ItemId,
    include_deleted: bool,
) -> StoreResult<Option<Note>> {
    let mut stmt = conn.prepare(&format!(
        "{NOTE_SELECT_SQL} WHERE id = ?1 AND (?2 = 1 OR deleted = 0);"
    ))?;
    let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_note_row(row)?));
    }
    Ok(None)
}

/// Writes the full merged note row. `deleted`/`date_deleted` are preserved
/// for existing rows unless explicitly provided.
pub(crate) fn upsert_note_row(
    conn: &Connection,
    note: &Note,
    deleted: bool,
    date_deleted: Option<i64>,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO notes (
            id, title, excerpt, content_id, tags, notebooks, color,
            pinned, favorite, readonly, local_only, conflicted,
            deleted, date_deleted, date_created, date_modified, date_edited, session_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            excerpt = excluded.excerpt,
            content_id = excluded.content_id,
            tags = excluded.tags,
            notebooks = excluded.notebooks,
            color = excluded.color,
            pinned = excluded.pinned,
            favorite = excluded.favorite,
            readonly = excluded.readonly,
            local_only = excluded.local_only,
            conflicted = excluded.conflicted,
            date_modified = excluded.date_modified,
            date_edited = excluded.date_edited,
            session_id = excluded.session_id;",
        params![
            note.id.to_string(),
            note.title,
            note.excerpt,
            note.content_id.map(|id| id.to_string()),
            encode_string_list(&note.tags),
            encode_string_list(&note.notebooks.iter().map(|id| id.to_string()).collect::<Vec<_>>()),
            note.color,
            bool_to_int(note.pinned),
            bool_to_int(note.favorite),
            bool_to_int(note.readonly),
            bool_to_int(note.local_only),
            bool_to_int(note.conflicted),
            bool_to_int(deleted),
            date_deleted,
            note.date_created,
            note.date_modified,
            note.date_edited,
            note.session_id,
        ],
    )?;
    Ok(())
}

pub(crate) fn parse_note_row(row: &Row<'_>) -> StoreResult<Note> {
    let tags_raw: String = row.get("tags")?;
    let notebooks_raw: String = row.get("notebooks")?;
    let notebooks = decode_string_list(&notebooks_raw, "notes.notebooks")?
        .iter()
        .map(|text| crate::collection::parse_id(text, "notes.notebooks"))
        .collect::<StoreResult<Vec<_>>>()?;
    let content_id = match row.get::<_, Option<String>>("content_id")? {
        Some(text) => Some(crate::collection::parse_id(&text, "notes.content_id")?),
        None => None,
    };
    Ok(Note {
        id: get_id(row, "id")?,
        title: row.get("title")?,
        excerpt: row.get("excerpt")?,
        content_id,
        tags: decode_string_list(&tags_raw, "notes.tags")?,
        notebooks,
        color: row.get("color")?,
        pinned: get_bool(row, "pinned")?,
        favorite: get_bool(row, "favorite")?,
        readonly: get_bool(row, "readonly")?,
        local_only: get_bool(row, "local_only")?,
        conflicted: get_bool(row, "conflicted")?,
        date_created: row.get("date_created")?,
        date_modified: row.get("date_modified")?,
        date_edited: row.get("date_edited")?,
        session_id: row.get("session_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::derive_excerpt;

    #[test]
    fn excerpt_strips_markup_and_collapses_whitespace() {
        let text = "# Heading\n\nSome **bold** text\twith   spacing";
        assert_eq!(
            derive_excerpt(text).as_deref(),
            Some("Heading Some bold text with spacing")
        );
    }

    #[test]
    fn excerpt_of_blank_text_is_none() {
        assert_eq!(derive_excerpt("   \n\t"), None);
    }
}
