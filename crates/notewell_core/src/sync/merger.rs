//! Merges pulled remote items into local state.
//!
//! # Responsibility
//! - Apply last-writer-wins by `date_modified` for metadata items and route
//!   content payloads through the conflict resolver.
//! - Commit one transaction per pulled batch; a bad item degrades to a
//!   logged skip, never a failed batch.
//!
//! # Invariants
//! - Pull and push happen outside any transaction.
//! - An item already holding a pending conflict is deferred untouched.
//! - Local-only content never leaves the device.

use crate::codec::ContentCodec;
use crate::collection::notes::{scrub_keyword_refs, upsert_note_row};
use crate::collection::reminders::upsert_reminder_row;
use crate::collection::{bool_to_int, get_id, StoreError, StoreResult};
use crate::conflict::{self, MergeOutcome, RemoteContent};
use crate::model::{
    ItemId, ItemRef, ItemType, Keyword, KeywordKind, Monograph, Note, Notebook, Relation, Reminder,
};
use crate::relation::RelationGraph;
use crate::sync::{RemoteItem, SyncKind, SyncResult, SyncTransport};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

/// Content payload envelope; `data` stays codec-opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentPayload {
    note_id: ItemId,
    kind: String,
    data: Vec<u8>,
}

/// Per-batch merge tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub applied: usize,
    pub skipped: usize,
    pub conflicted: usize,
    /// Items parked behind an unresolved conflict.
    pub deferred: usize,
    /// Items dropped for undecodable or corrupt payloads.
    pub failed: usize,
}

impl MergeReport {
    fn absorb(&mut self, other: MergeReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.conflicted += other.conflicted;
        self.deferred += other.deferred;
        self.failed += other.failed;
    }
}

/// Outcome of one full pull-merge-push run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub merge: MergeReport,
    pub pushed: usize,
}

/// The merge engine over one connection.
pub struct Merger<'a> {
    conn: &'a mut Connection,
    codec: &'a dyn ContentCodec,
}

impl<'a> Merger<'a> {
    pub fn new(conn: &'a mut Connection, codec: &'a dyn ContentCodec) -> Self {
        Self { conn, codec }
    }

    /// Pulls from the transport, merges batch by batch, then pushes local
    /// unsynced content.
    pub fn sync(
        &mut self,
        transport: &mut dyn SyncTransport,
        since_ms: i64,
    ) -> SyncResult<SyncReport> {
        let batches = transport.pull(since_ms)?;
        let mut report = SyncReport::default();
        for batch in &batches {
            report.merge.absorb(self.merge_batch(batch)?);
        }

        let outbox = self.unsynced_content()?;
        if !outbox.is_empty() {
            let outcome = transport.push(&outbox)?;
            self.mark_pushed(&outbox)?;
            report.pushed = outcome.accepted;
        }
        debug!(
            "event=sync module=sync status=ok batches={} applied={} conflicted={} pushed={}",
            batches.len(),
            report.merge.applied,
            report.merge.conflicted,
            report.pushed
        );
        Ok(report)
    }

    /// Merges one batch inside one transaction.
    pub fn merge_batch(&mut self, items: &[RemoteItem]) -> StoreResult<MergeReport> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut report = MergeReport::default();
        for item in items {
            match merge_one(&tx, self.codec, item) {
                Ok(MergeOutcome::Applied) => report.applied += 1,
                Ok(MergeOutcome::Skipped) => report.skipped += 1,
                Ok(MergeOutcome::Conflicted) => report.conflicted += 1,
                Err(StoreError::ConflictState(note_id)) => {
                    report.deferred += 1;
                    debug!(
                        "event=merge module=sync status=deferred kind={} id={} note={note_id}",
                        item.kind.as_str(),
                        item.id
                    );
                }
                Err(StoreError::Decryption(err)) => {
                    report.failed += 1;
                    warn!(
                        "event=merge module=sync status=skipped kind={} id={} reason={err}",
                        item.kind.as_str(),
                        item.id
                    );
                }
                Err(StoreError::InvalidData(detail)) => {
                    report.failed += 1;
                    warn!(
                        "event=merge module=sync status=skipped kind={} id={} reason={detail}",
                        item.kind.as_str(),
                        item.id
                    );
                }
                Err(err) => return Err(err),
            }
        }
        tx.commit()?;
        Ok(report)
    }

    /// Local content rows awaiting upload, as wire items.
    fn unsynced_content(&self) -> StoreResult<Vec<RemoteItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, note_id, kind, data, date_modified, session_id
             FROM content
             WHERE synced = 0 AND local_only = 0 AND conflicted IS NULL
             ORDER BY date_modified ASC, id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut outbox = Vec::new();
        while let Some(row) = rows.next()? {
            let envelope = ContentPayload {
                note_id: get_id(row, "note_id")?,
                kind: row.get("kind")?,
                data: row.get("data")?,
            };
            let payload = serde_json::to_vec(&envelope).map_err(|err| {
                StoreError::InvalidData(format!("content envelope encode failed: {err}"))
            })?;
            outbox.push(RemoteItem {
                kind: SyncKind::Content,
                id: get_id(row, "id")?,
                payload,
                date_modified: row.get("date_modified")?,
                session_id: row.get("session_id")?,
                deleted: false,
            });
        }
        Ok(outbox)
    }

    fn mark_pushed(&mut self, items: &[RemoteItem]) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for item in items {
            tx.execute(
                "UPDATE content SET synced = 1 WHERE id = ?1;",
                [item.id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn merge_one(
    tx: &Transaction<'_>,
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<MergeOutcome> {
    match item.kind {
        SyncKind::Content => merge_content(tx, item),
        SyncKind::Note => merge_note(tx, codec, item),
        SyncKind::Notebook => merge_notebook(tx, codec, item),
        SyncKind::Tag | SyncKind::Color => merge_keyword(tx, codec, item),
        SyncKind::Reminder => merge_reminder(tx, codec, item),
        SyncKind::Relation => merge_relation(tx, codec, item),
        SyncKind::Monograph => merge_monograph(tx, codec, item),
    }
}

fn merge_content(tx: &Transaction<'_>, item: &RemoteItem) -> StoreResult<MergeOutcome> {
    if item.deleted {
        let removed = tx.execute(
            "DELETE FROM content WHERE id = ?1 AND conflicted IS NULL;",
            [item.id.to_string()],
        )?;
        return Ok(if removed > 0 {
            MergeOutcome::Applied
        } else {
            MergeOutcome::Skipped
        });
    }
    let envelope: ContentPayload = serde_json::from_slice(&item.payload).map_err(|err| {
        StoreError::InvalidData(format!("content envelope decode failed: {err}"))
    })?;
    conflict::merge_remote_content(
        tx,
        &RemoteContent {
            id: item.id,
            note_id: envelope.note_id,
            kind: envelope.kind,
            data: envelope.data,
            date_modified: item.date_modified,
            session_id: item.session_id,
        },
    )
}

fn merge_note(
    tx: &Transaction<'_>,
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<MergeOutcome> {
    if remote_is_stale(tx, "notes", item)? {
        return Ok(MergeOutcome::Skipped);
    }
    if item.deleted {
        tx.execute(
            "UPDATE notes SET deleted = 1, date_deleted = ?2, date_modified = ?2 WHERE id = ?1;",
            params![item.id.to_string(), item.date_modified],
        )?;
        return Ok(MergeOutcome::Applied);
    }
    let note: Note = decode_metadata(codec, item)?;
    upsert_note_row(tx, &note, false, None)?;
    Ok(MergeOutcome::Applied)
}

fn merge_notebook(
    tx: &Transaction<'_>,
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<MergeOutcome> {
    if remote_is_stale(tx, "notebooks", item)? {
        return Ok(MergeOutcome::Skipped);
    }
    if item.deleted {
        tx.execute(
            "UPDATE notebooks SET deleted = 1, date_deleted = ?2, date_modified = ?2 WHERE id = ?1;",
            params![item.id.to_string(), item.date_modified],
        )?;
        return Ok(MergeOutcome::Applied);
    }
    let notebook: Notebook = decode_metadata(codec, item)?;
    // The local tombstone survives a metadata update, same as for notes;
    // only an explicit restore clears it.
    tx.execute(
        "INSERT INTO notebooks (id, title, description, pinned, deleted, date_deleted, date_created, date_modified)
         VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            pinned = excluded.pinned,
            date_modified = excluded.date_modified;",
        params![
            notebook.id.to_string(),
            notebook.title,
            notebook.description,
            bool_to_int(notebook.pinned),
            notebook.date_created,
            notebook.date_modified,
        ],
    )?;
    Ok(MergeOutcome::Applied)
}

fn merge_keyword(
    tx: &Transaction<'_>,
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<MergeOutcome> {
    if remote_is_stale(tx, "keywords", item)? {
        return Ok(MergeOutcome::Skipped);
    }
    if item.deleted {
        let row: Option<(String, String)> = tx
            .query_row(
                "SELECT kind, title FROM keywords WHERE id = ?1;",
                [item.id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((kind_text, title)) = row else {
            return Ok(MergeOutcome::Skipped);
        };
        let kind = KeywordKind::parse(&kind_text).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid keyword kind `{kind_text}` in keywords.kind"))
        })?;
        scrub_keyword_refs(tx, kind, item.id, &title)?;
        tx.execute("DELETE FROM keywords WHERE id = ?1;", [item.id.to_string()])?;
        RelationGraph::new(tx).unlink_all(ItemRef::new(kind.item_type(), item.id))?;
        return Ok(MergeOutcome::Applied);
    }
    let keyword: Keyword = decode_metadata(codec, item)?;
    tx.execute(
        "INSERT INTO keywords (id, kind, title, date_created, date_modified)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            date_modified = excluded.date_modified;",
        params![
            keyword.id.to_string(),
            keyword.kind.as_str(),
            keyword.title,
            keyword.date_created,
            keyword.date_modified,
        ],
    )?;
    Ok(MergeOutcome::Applied)
}

fn merge_reminder(
    tx: &Transaction<'_>,
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<MergeOutcome> {
    if remote_is_stale(tx, "reminders", item)? {
        return Ok(MergeOutcome::Skipped);
    }
    if item.deleted {
        tx.execute("DELETE FROM reminders WHERE id = ?1;", [item.id.to_string()])?;
        RelationGraph::new(tx).unlink_all(ItemRef::new(ItemType::Reminder, item.id))?;
        return Ok(MergeOutcome::Applied);
    }
    let reminder: Reminder = decode_metadata(codec, item)?;
    reminder
        .validate()
        .map_err(|err| StoreError::InvalidData(format!("remote reminder invalid: {err}")))?;
    upsert_reminder_row(tx, &reminder)?;
    Ok(MergeOutcome::Applied)
}

fn merge_relation(
    tx: &Transaction<'_>,
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<MergeOutcome> {
    let relation: Relation = decode_metadata(codec, item)?;
    if item.deleted {
        let removed = tx.execute(
            "DELETE FROM relations
             WHERE from_type = ?1 AND from_id = ?2 AND to_type = ?3 AND to_id = ?4;",
            params![
                relation.from.kind.as_str(),
                relation.from.id.to_string(),
                relation.to.kind.as_str(),
                relation.to.id.to_string(),
            ],
        )?;
        return Ok(if removed > 0 {
            MergeOutcome::Applied
        } else {
            MergeOutcome::Skipped
        });
    }
    let added = tx.execute(
        "INSERT OR IGNORE INTO relations (from_type, from_id, to_type, to_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            relation.from.kind.as_str(),
            relation.from.id.to_string(),
            relation.to.kind.as_str(),
            relation.to.id.to_string(),
            relation.date_created,
        ],
    )?;
    Ok(if added > 0 {
        MergeOutcome::Applied
    } else {
        MergeOutcome::Skipped
    })
}

fn merge_monograph(
    tx: &Transaction<'_>,
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<MergeOutcome> {
    if item.deleted {
        tx.execute(
            "DELETE FROM monographs WHERE note_id = ?1;",
            [item.id.to_string()],
        )?;
        RelationGraph::new(tx).unlink_all(ItemRef::new(ItemType::Monograph, item.id))?;
        return Ok(MergeOutcome::Applied);
    }
    let monograph: Monograph = decode_metadata(codec, item)?;
    tx.execute(
        "INSERT INTO monographs (note_id, published_at, password, self_destruct)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(note_id) DO UPDATE SET
            published_at = excluded.published_at,
            password = excluded.password,
            self_destruct = excluded.self_destruct;",
        params![
            monograph.note_id.to_string(),
            monograph.published_at,
            monograph.password,
            bool_to_int(monograph.self_destruct),
        ],
    )?;
    Ok(MergeOutcome::Applied)
}

/// Decodes a metadata payload through the codec, then parses the plaintext.
fn decode_metadata<T: for<'de> Deserialize<'de>>(
    codec: &dyn ContentCodec,
    item: &RemoteItem,
) -> StoreResult<T> {
    let decoded = codec.decode(&item.payload)?;
    serde_json::from_str(&decoded.text).map_err(|err| {
        StoreError::InvalidData(format!(
            "remote {} payload decode failed: {err}",
            item.kind.as_str()
        ))
    })
}

/// Last-writer-wins guard: true when the local row is at least as new.
fn remote_is_stale(tx: &Transaction<'_>, table: &str, item: &RemoteItem) -> StoreResult<bool> {
    let local: Option<i64> = tx
        .query_row(
            &format!("SELECT date_modified FROM {table} WHERE id = ?1;"),
            [item.id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(matches!(local, Some(stamp) if stamp >= item.date_modified))
}
