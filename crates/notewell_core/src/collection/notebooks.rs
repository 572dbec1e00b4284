//! Notebooks collection: CRUD, nesting and note membership.
//!
//! # Responsibility
//! - Own the `notebooks` table.
//! - Express nesting as notebook-contains-notebook relation edges and note
//!   membership as notebook-contains-note edges, mirrored into the note's
//!   denormalized notebook list.
//!
//! # Invariants
//! - Titles are required and non-blank.
//! - Nesting stays acyclic: linking an ancestor under its descendant fails
//!   validation before any write.
//! - Child ordering follows edge `date_created`; reordering is
//!   delete-then-re-add (see `relation::RelationGraph`).

use crate::collection::notes::{note_by_id, upsert_note_row};
use crate::collection::{bool_to_int, get_bool, get_id, StoreError, StoreResult};
use crate::model::{
    now_ms, ItemId, ItemRef, ItemType, Notebook, NotebookPatch, ValidationError,
};
use crate::relation::{Endpoint, RelationGraph};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

pub(crate) const NOTEBOOK_SELECT_SQL: &str = "SELECT
    id, title, description, pinned, date_created, date_modified
FROM notebooks";

/// Notebooks collection facade over one connection.
pub struct Notebooks<'a> {
    conn: &'a mut Connection,
}

impl<'a> Notebooks<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Creates a notebook or applies a field-level patch. Returns the id.
    pub fn add(&mut self, patch: NotebookPatch) -> StoreResult<ItemId> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle(ItemType::Notebook).into());
            }
        }

        let id = patch.id.unwrap_or_else(Uuid::new_v4);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = notebook_by_id(&tx, id, false)?;

        let now = now_ms();
        let mut notebook = existing.unwrap_or(Notebook {
            id,
            title: String::new(),
            description: None,
            pinned: false,
            date_created: now,
            date_modified: now,
        });

        match patch.title {
            Some(title) => notebook.title = title,
            None if notebook.title.is_empty() => {
                return Err(ValidationError::EmptyTitle(ItemType::Notebook).into());
            }
            None => {}
        }
        if !patch.description.is_keep() {
            notebook.description = patch.description.apply(notebook.description);
        }
        if let Some(pinned) = patch.pinned {
            notebook.pinned = pinned;
        }
        notebook.date_modified = now;

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
        tx.commit()?;
        Ok(id)
    }

    /// Gets one active notebook.
    pub fn notebook(&self, id: ItemId) -> StoreResult<Option<Notebook>> {
        notebook_by_id(self.conn, id, false)
    }

    /// Lists all active notebooks sorted by title.
    pub fn all(&self) -> StoreResult<Vec<Notebook>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTEBOOK_SELECT_SQL} WHERE deleted = 0 ORDER BY title ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut notebooks = Vec::new();
        while let Some(row) = rows.next()? {
            notebooks.push(parse_notebook_row(row)?);
        }
        Ok(notebooks)
    }

    /// Soft-deletes notebooks to the Trash. Missing ids are no-ops.
    pub fn remove(&mut self, ids: &[ItemId]) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_ms();
        for id in ids {
            tx.execute(
                "UPDATE notebooks
                 SET deleted = 1, date_deleted = ?2, date_modified = ?2
                 WHERE id = ?1 AND deleted = 0;",
                params![id.to_string(), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Nests `child` under `parent`. Idempotent; cycle-safe.
    pub fn add_child(&mut self, parent: ItemId, child: ItemId) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        require_notebook(&tx, parent)?;
        require_notebook(&tx, child)?;
        if parent == child || is_reachable(&tx, child, parent)? {
            return Err(ValidationError::NotebookCycle { parent, child }.into());
        }
        RelationGraph::new(&tx).add(
            ItemRef::new(ItemType::Notebook, parent),
            ItemRef::new(ItemType::Notebook, child),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Unnests `child` from `parent`. Missing edges are no-ops.
    pub fn remove_child(&mut self, parent: ItemId, child: ItemId) -> StoreResult<()> {
        RelationGraph::new(self.conn).unlink(
            Endpoint::Exact(ItemRef::new(ItemType::Notebook, parent)),
            Endpoint::Exact(ItemRef::new(ItemType::Notebook, child)),
        )?;
        Ok(())
    }

    /// Direct sub-notebooks of `parent`, in link order.
    pub fn children(&self, parent: ItemId) -> StoreResult<Vec<ItemId>> {
        let refs = RelationGraph::new(self.conn).from_refs(
            ItemRef::new(ItemType::Notebook, parent),
            ItemType::Notebook,
        )?;
        Ok(refs.into_iter().map(|r| r.id).collect())
    }

    /// Adds a note to this notebook, maintaining the edge and the note's
    /// denormalized notebook list in one transaction.
    pub fn add_note(&mut self, notebook_id: ItemId, note_id: ItemId) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        require_notebook(&tx, notebook_id)?;
        let mut note = note_by_id(&tx, note_id, false)?.ok_or(StoreError::NotFound {
            kind: ItemType::Note,
            id: note_id,
        })?;

        RelationGraph::new(&tx).add(
            ItemRef::new(ItemType::Notebook, notebook_id),
            ItemRef::new(ItemType::Note, note_id),
        )?;
        if !note.notebooks.contains(&notebook_id) {
            note.notebooks.push(notebook_id);
            note.date_modified = now_ms();
            upsert_note_row(&tx, &note, false, None)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Removes a note from this notebook. Missing membership is a no-op.
    pub fn remove_note(&mut self, notebook_id: ItemId, note_id: ItemId) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        RelationGraph::new(&tx).unlink(
            Endpoint::Exact(ItemRef::new(ItemType::Notebook, notebook_id)),
            Endpoint::Exact(ItemRef::new(ItemType::Note, note_id)),
        )?;
        if let Some(mut note) = note_by_id(&tx, note_id, true)? {
            if let Some(position) = note.notebooks.iter().position(|id| *id == notebook_id) {
                note.notebooks.remove(position);
                note.date_modified = now_ms();
                upsert_note_row(&tx, &note, false, None)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Notes directly contained in `notebook_id`, in link order.
    pub fn notes(&self, notebook_id: ItemId) -> StoreResult<Vec<ItemId>> {
        let refs = RelationGraph::new(self.conn)
            .from_refs(ItemRef::new(ItemType::Notebook, notebook_id), ItemType::Note)?;
        Ok(refs.into_iter().map(|r| r.id).collect())
    }
}

/// Whether `target` is reachable from `start` by following nesting edges.
fn is_reachable(conn: &Connection, start: ItemId, target: ItemId) -> StoreResult<bool> {
    let graph = RelationGraph::new(conn);
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        if current == target {
            return Ok(true);
        }
        if !seen.insert(current) {
            continue;
        }
        for child in graph.from_refs(
            ItemRef::new(ItemType::Notebook, current),
            ItemType::Notebook,
        )? {
            queue.push_back(child.id);
        }
    }
    Ok(false)
}

fn require_notebook(conn: &Connection, id: ItemId) -> StoreResult<()> {
    notebook_by_id(conn, id, false)?
        .map(|_| ())
        .ok_or(StoreError::NotFound {
            kind: ItemType::Notebook,
            id,
        })
}

pub(crate) fn notebook_by_id(
    conn: &Connection,
    id: ItemId,
    include_deleted: bool,
) -> StoreResult<Option<Notebook>> {
    let mut stmt = conn.prepare(&format!(
        "{NOTEBOOK_SELECT_SQL} WHERE id = ?1 AND (?2 = 1 OR deleted = 0);"
    ))?;
    let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_notebook_row(row)?));
    }
    Ok(None)
}

pub(crate) fn parse_notebook_row(row: &Row<'_>) -> StoreResult<Notebook> {
    Ok(Notebook {
        id: get_id(row, "id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        pinned: get_bool(row, "pinned")?,
        date_created: row.get("date_created")?,
        date_modified: row.get("date_modified")?,
    })
}
