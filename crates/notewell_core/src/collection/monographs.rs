//! Monographs collection: published-note records.
//!
//! A monograph exists iff its note is currently published. The row id is the
//! note id, so publish upserts and unpublish point-deletes.

use crate::collection::notes::note_by_id;
use crate::collection::{bool_to_int, get_bool, get_id, row_exists, StoreError, StoreResult};
use crate::model::{now_ms, ItemId, ItemRef, ItemType, Monograph, MonographOptions};
use crate::relation::RelationGraph;
use rusqlite::{params, Connection, Row, TransactionBehavior};

/// Monographs collection facade over one connection.
pub struct Monographs<'a> {
    conn: &'a mut Connection,
}

impl<'a> Monographs<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Publishes a note. Re-publishing refreshes options and the publish
    /// stamp. Fails with NotFound for missing or trashed notes.
    pub fn publish(&mut self, note_id: ItemId, options: MonographOptions) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if note_by_id(&tx, note_id, false)?.is_none() {
            return Err(StoreError::NotFound {
                kind: ItemType::Note,
                id: note_id,
            });
        }
        tx.execute(
            "INSERT INTO monographs (note_id, published_at, password, self_destruct)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(note_id) DO UPDATE SET
                published_at = excluded.published_at,
                password = excluded.password,
                self_destruct = excluded.self_destruct;",
            params![
                note_id.to_string(),
                now_ms(),
                options.password,
                bool_to_int(options.self_destruct),
            ],
        )?;
        RelationGraph::new(&tx).add(
            ItemRef::new(ItemType::Note, note_id),
            ItemRef::new(ItemType::Monograph, note_id),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Unpublishes a note. Idempotent.
    pub fn unpublish(&mut self, note_id: ItemId) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM monographs WHERE note_id = ?1;",
            [note_id.to_string()],
        )?;
        RelationGraph::new(&tx).unlink_all(ItemRef::new(ItemType::Monograph, note_id))?;
        tx.commit()?;
        Ok(())
    }

    /// Gets the published record for a note, if any.
    pub fn monograph(&self, note_id: ItemId) -> StoreResult<Option<Monograph>> {
        let mut stmt = self.conn.prepare(
            "SELECT note_id, published_at, password, self_destruct
             FROM monographs WHERE note_id = ?1;",
        )?;
        let mut rows = stmt.query([note_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_monograph_row(row)?));
        }
        Ok(None)
    }

    pub fn is_published(&self, note_id: ItemId) -> StoreResult<bool> {
        row_exists(
            self.conn,
            "SELECT EXISTS(SELECT 1 FROM monographs WHERE note_id = ?1);",
            [note_id.to_string()],
        )
    }

    /// Lists all published records, newest first.
    pub fn all(&self) -> StoreResult<Vec<Monograph>> {
        let mut stmt = self.conn.prepare(
            "SELECT note_id, published_at, password, self_destruct
             FROM monographs ORDER BY published_at DESC, note_id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut monographs = Vec::new();
        while let Some(row) = rows.next()? {
            monographs.push(parse_monograph_row(row)?);
        }
        Ok(monographs)
    }
}

fn parse_monograph_row(row: &Row<'_>) -> StoreResult<Monograph> {
    Ok(Monograph {
        note_id: get_id(row, "note_id")?,
        published_at: row.get("published_at")?,
        password: row.get("password")?,
        self_destruct: get_bool(row, "self_destruct")?,
    })
}
