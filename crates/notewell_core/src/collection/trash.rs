//! Trash: the soft-delete holding area for notes and notebooks.
//!
//! # Responsibility
//! - List tombstoned items, restore them, or purge them permanently.
//!
//! # Invariants
//! - Purge is the only hard-delete path: it removes the row, its owned
//!   content (for notes), its published record, and every relation edge in
//!   one transaction, so no edge or content row outlives its owner.
//! - A purged notebook is also scrubbed from every note's denormalized
//!   notebook list; no note keeps a dangling id.
//! - Restore and purge are idempotent over missing ids.

use crate::collection::notes::scrub_notebook_refs;
use crate::collection::{get_id, StoreResult};
use crate::model::{now_ms, ItemId, ItemRef, ItemType};
use crate::relation::RelationGraph;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

/// One tombstoned item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashItem {
    pub kind: ItemType,
    pub id: ItemId,
    pub title: String,
    pub date_deleted: i64,
}

/// Trash facade over one connection.
pub struct Trash<'a> {
    conn: &'a mut Connection,
}

impl<'a> Trash<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Lists trashed notes and notebooks, most recently deleted first.
    pub fn all(&self) -> StoreResult<Vec<TrashItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT 'note' AS kind, id, title, date_deleted FROM notes WHERE deleted = 1
             UNION ALL
             SELECT 'notebook' AS kind, id, title, date_deleted FROM notebooks WHERE deleted = 1
             ORDER BY date_deleted DESC, id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let kind_text: String = row.get("kind")?;
            let kind = ItemType::parse(&kind_text).ok_or_else(|| {
                crate::collection::StoreError::InvalidData(format!(
                    "invalid trash kind `{kind_text}`"
                ))
            })?;
            items.push(TrashItem {
                kind,
                id: get_id(row, "id")?,
                title: row.get("title")?,
                date_deleted: row.get("date_deleted")?,
            });
        }
        Ok(items)
    }

    /// Restores tombstoned items. Missing or active ids are no-ops.
    pub fn restore(&mut self, ids: &[ItemId]) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_ms();
        for id in ids {
            for table in ["notes", "notebooks"] {
                tx.execute(
                    &format!(
                        "UPDATE {table}
                         SET deleted = 0, date_deleted = NULL, date_modified = ?2
                         WHERE id = ?1 AND deleted = 1;"
                    ),
                    params![id.to_string(), now],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Permanently deletes tombstoned items. Missing ids are no-ops.
    pub fn purge(&mut self, ids: &[ItemId]) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for id in ids {
            purge_one(&tx, *id)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Empties the trash entirely.
    pub fn clear(&mut self) -> StoreResult<()> {
        let ids = self.all()?.into_iter().map(|item| item.id).collect::<Vec<_>>();
        self.purge(&ids)
    }
}

fn purge_one(tx: &Transaction<'_>, id: ItemId) -> StoreResult<()> {
    let graph = RelationGraph::new(tx);
    let id_text = id.to_string();

    let note_deleted = tx.execute(
        "DELETE FROM notes WHERE id = ?1 AND deleted = 1;",
        [id_text.as_str()],
    )?;
    if note_deleted > 0 {
        // Orphaned content is garbage; collect it with its owner.
        tx.execute("DELETE FROM content WHERE note_id = ?1;", [id_text.as_str()])?;
        tx.execute(
            "DELETE FROM monographs WHERE note_id = ?1;",
            [id_text.as_str()],
        )?;
        graph.unlink_all(ItemRef::new(ItemType::Note, id))?;
        graph.unlink_all(ItemRef::new(ItemType::Monograph, id))?;
        return Ok(());
    }

    let notebook_deleted = tx.execute(
        "DELETE FROM notebooks WHERE id = ?1 AND deleted = 1;",
        [id_text.as_str()],
    )?;
    if notebook_deleted > 0 {
        // Denormalized lists first: the edges tell us which notes to rewrite.
        scrub_notebook_refs(tx, id)?;
        graph.unlink_all(ItemRef::new(ItemType::Notebook, id))?;
    }
    Ok(())
}
