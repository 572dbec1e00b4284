//! Conflict resolver for concurrently edited note bodies.
//!
//! # Responsibility
//! - Decide, during merge, whether a remote content row overwrites the local
//!   one or parks as a pending conflict.
//! - Drive the three explicit resolution paths.
//!
//! # Invariants
//! - A conflicted content row keeps the local payload in `data` and the
//!   remote payload in `conflicted`; nothing is discarded until the user
//!   resolves.
//! - Detection never resolves: a row already holding a pending conflict
//!   defers further remote payloads instead of stacking them.
//! - Resolution is a no-op on non-conflicted notes and stamps
//!   `date_resolved` plus a fresh session id when it does run.

use crate::codec::ContentCodec;
use crate::collection::notes::{derive_excerpt, note_by_id, upsert_note_row};
use crate::collection::{get_bool, get_id, StoreError, StoreResult};
use crate::model::{now_ms, ItemId, ItemRef, ItemType, Note};
use crate::relation::RelationGraph;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

/// Stamp distance beyond which two diverging edits stop being an ordinary
/// last-writer-wins race and become a user-facing conflict.
pub const CONFLICT_THRESHOLD_MS: i64 = 60_000;

const CONFLICT_SUFFIX: &str = " (Conflict)";

/// What the merge decision did with one remote content row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Remote payload written (new row, identical payload, or it won the
    /// last-writer-wins race).
    Applied,
    /// Local payload kept; remote was older or identical in effect.
    Skipped,
    /// Diverging edits parked for explicit resolution.
    Conflicted,
}

/// One remote content payload as the merge path sees it.
#[derive(Debug, Clone)]
pub struct RemoteContent {
    pub id: ItemId,
    pub note_id: ItemId,
    pub kind: String,
    pub data: Vec<u8>,
    pub date_modified: i64,
    pub session_id: i64,
}

struct LocalContent {
    note_id: ItemId,
    data: Vec<u8>,
    conflicted: bool,
    date_modified: i64,
    synced: bool,
}

fn local_content(conn: &Connection, id: ItemId) -> StoreResult<Option<LocalContent>> {
    let mut stmt = conn.prepare(
        "SELECT note_id, data, conflicted IS NOT NULL AS conflicted, date_modified, synced
         FROM content WHERE id = ?1;",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(LocalContent {
            note_id: get_id(row, "note_id")?,
            data: row.get("data")?,
            conflicted: get_bool(row, "conflicted")?,
            date_modified: row.get("date_modified")?,
            synced: get_bool(row, "synced")?,
        }));
    }
    Ok(None)
}

/// Overwrites (or creates) the local row with the remote payload, marked
/// synced since it now mirrors the server.
fn write_remote_row(conn: &Connection, remote: &RemoteContent) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO content (id, note_id, kind, data, date_modified, session_id, local_only, synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1)
         ON CONFLICT(id) DO UPDATE SET
            kind = excluded.kind,
            data = excluded.data,
            date_modified = excluded.date_modified,
            session_id = excluded.session_id,
            synced = 1;",
        params![
            remote.id.to_string(),
            remote.note_id.to_string(),
            remote.kind,
            remote.data,
            remote.date_modified,
            remote.session_id,
        ],
    )?;
    Ok(())
}

/// Merges one remote content row against local state.
///
/// Runs inside the caller's merge transaction. Returns
/// `StoreError::ConflictState` when the row already holds a pending
/// conflict; the caller defers the item rather than failing the batch.
pub(crate) fn merge_remote_content(
    conn: &Connection,
    remote: &RemoteContent,
) -> StoreResult<MergeOutcome> {
    let Some(local) = local_content(conn, remote.id)? else {
        write_remote_row(conn, remote)?;
        return Ok(MergeOutcome::Applied);
    };

    if local.conflicted {
        return Err(StoreError::ConflictState(local.note_id));
    }

    if local.data == remote.data {
        conn.execute(
            "UPDATE content SET synced = 1 WHERE id = ?1;",
            [remote.id.to_string()],
        )?;
        return Ok(MergeOutcome::Skipped);
    }

    // A synced local row carries no unpushed edit, so the newer side wins
    // outright. The same holds for diverging edits within the threshold.
    let drift = (local.date_modified - remote.date_modified).abs();
    if local.synced || drift <= CONFLICT_THRESHOLD_MS {
        if remote.date_modified > local.date_modified {
            write_remote_row(conn, remote)?;
            return Ok(MergeOutcome::Applied);
        }
        return Ok(MergeOutcome::Skipped);
    }

    conn.execute(
        "UPDATE content SET conflicted = ?2, date_resolved = NULL WHERE id = ?1;",
        params![remote.id.to_string(), remote.data],
    )?;
    conn.execute(
        "UPDATE notes SET conflicted = 1, date_modified = ?2 WHERE id = ?1;",
        params![local.note_id.to_string(), now_ms()],
    )?;
    debug!(
        "event=conflict_parked module=conflict status=ok note={} drift_ms={drift}",
        local.note_id
    );
    Ok(MergeOutcome::Conflicted)
}

/// Conflict resolution facade over one connection.
pub struct Conflicts<'a> {
    conn: &'a mut Connection,
    codec: &'a dyn ContentCodec,
}

impl<'a> Conflicts<'a> {
    pub fn new(conn: &'a mut Connection, codec: &'a dyn ContentCodec) -> Self {
        Self { conn, codec }
    }

    /// Notes with a pending conflict, oldest modification first.
    pub fn all(&self) -> StoreResult<Vec<ItemId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM notes WHERE conflicted = 1 AND deleted = 0
             ORDER BY date_modified ASC, id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(get_id(row, "id")?);
        }
        Ok(ids)
    }

    pub fn is_conflicted(&self, note_id: ItemId) -> StoreResult<bool> {
        let note = require_note(self.conn, note_id)?;
        Ok(note.conflicted)
    }

    /// Keeps the local payload and discards the remote one.
    pub fn accept_local(&mut self, note_id: ItemId) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some((mut note, content_id)) = conflicted_pair(&tx, note_id)? else {
            return Ok(());
        };
        let now = now_ms();
        // The kept local edit was never pushed; it goes out on the next sync.
        tx.execute(
            "UPDATE content
             SET conflicted = NULL, date_resolved = ?2, date_modified = ?2,
                 session_id = session_id + 1, synced = 0
             WHERE id = ?1;",
            params![content_id.to_string(), now],
        )?;
        clear_note_flag(&tx, &mut note, now)?;
        tx.commit()?;
        debug!("event=conflict_resolve module=conflict status=ok note={note_id} choice=local");
        Ok(())
    }

    /// Promotes the remote payload and discards the local one.
    pub fn accept_remote(&mut self, note_id: ItemId) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some((mut note, content_id)) = conflicted_pair(&tx, note_id)? else {
            return Ok(());
        };
        let now = now_ms();
        promote_remote(&tx, self.codec, &mut note, content_id, now)?;
        clear_note_flag(&tx, &mut note, now)?;
        tx.commit()?;
        debug!("event=conflict_resolve module=conflict status=ok note={note_id} choice=remote");
        Ok(())
    }

    /// Promotes the remote payload into the note and spawns a duplicate
    /// note carrying the local payload, so neither edit is lost.
    pub fn keep_both(&mut self, note_id: ItemId) -> StoreResult<ItemId> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some((mut note, content_id)) = conflicted_pair(&tx, note_id)? else {
            return Ok(note_id);
        };
        let now = now_ms();

        let copy_id = Uuid::new_v4();
        let copy_content_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO content (id, note_id, kind, data, date_modified, session_id, local_only, synced)
             SELECT ?2, ?3, kind, data, ?4, 0, local_only, 0 FROM content WHERE id = ?1;",
            params![
                content_id.to_string(),
                copy_content_id.to_string(),
                copy_id.to_string(),
                now,
            ],
        )?;
        let copy = Note {
            id: copy_id,
            title: format!("{}{CONFLICT_SUFFIX}", note.title),
            content_id: Some(copy_content_id),
            conflicted: false,
            pinned: false,
            favorite: false,
            readonly: false,
            date_created: now,
            date_modified: now,
            date_edited: now,
            session_id: 0,
            ..note.clone()
        };
        upsert_note_row(&tx, &copy, false, None)?;

        // The copy inherits the denormalized tag/color/notebook lists, so it
        // needs the matching edges too.
        let graph = RelationGraph::new(&tx);
        let copy_ref = ItemRef::new(ItemType::Note, copy_id);
        for kind in [ItemType::Tag, ItemType::Color, ItemType::Notebook] {
            for linked in graph.to_refs(ItemRef::new(ItemType::Note, note_id), kind)? {
                graph.add(linked, copy_ref)?;
            }
        }

        promote_remote(&tx, self.codec, &mut note, content_id, now)?;
        clear_note_flag(&tx, &mut note, now)?;
        tx.commit()?;
        debug!(
            "event=conflict_resolve module=conflict status=ok note={note_id} choice=both copy={copy_id}"
        );
        Ok(copy_id)
    }
}

/// Loads the note and its content id when a conflict is actually pending.
/// `Ok(None)` makes resolution a no-op; a missing note is an error.
fn conflicted_pair(
    conn: &Connection,
    note_id: ItemId,
) -> StoreResult<Option<(Note, ItemId)>> {
    let note = require_note(conn, note_id)?;
    if !note.conflicted {
        return Ok(None);
    }
    let Some(content_id) = note.content_id else {
        warn!("event=conflict_resolve module=conflict status=skip note={note_id} reason=no_content");
        return Ok(None);
    };
    let pending: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM content WHERE id = ?1 AND conflicted IS NOT NULL;",
            [content_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if pending.is_none() {
        return Ok(None);
    }
    Ok(Some((note, content_id)))
}

fn require_note(conn: &Connection, note_id: ItemId) -> StoreResult<Note> {
    note_by_id(conn, note_id, false)?.ok_or(StoreError::NotFound {
        kind: ItemType::Note,
        id: note_id,
    })
}

/// Moves `content.conflicted` into `data` and refreshes the note excerpt.
fn promote_remote(
    conn: &Connection,
    codec: &dyn ContentCodec,
    note: &mut Note,
    content_id: ItemId,
    now: i64,
) -> StoreResult<()> {
    conn.execute(
        "UPDATE content
         SET data = conflicted, conflicted = NULL, date_resolved = ?2,
             date_modified = ?2, session_id = session_id + 1, synced = 1
         WHERE id = ?1;",
        params![content_id.to_string(), now],
    )?;
    let data: Vec<u8> = conn.query_row(
        "SELECT data FROM content WHERE id = ?1;",
        [content_id.to_string()],
        |row| row.get(0),
    )?;
    match codec.decode(&data) {
        Ok(decoded) => note.excerpt = derive_excerpt(&decoded.text),
        // The payload stays; only the derived preview is unavailable.
        Err(err) => warn!(
            "event=conflict_resolve module=conflict status=degraded note={} reason={err}",
            note.id
        ),
    }
    Ok(())
}

fn clear_note_flag(conn: &Connection, note: &mut Note, now: i64) -> StoreResult<()> {
    note.conflicted = false;
    note.date_modified = now;
    note.session_id += 1;
    upsert_note_row(conn, note, false, None)?;
    Ok(())
}
