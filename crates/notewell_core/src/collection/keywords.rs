//! Keywords collection: tag and color rows.
//!
//! # Responsibility
//! - Get-or-create keyword rows by normalized title.
//! - Prune keywords that nothing references anymore.
//!
//! # Invariants
//! - `(kind, title)` is unique; tag titles are stored lowercase.
//! - A keyword row with zero relation references is garbage and prunable.

use crate::collection::notes::scrub_keyword_refs;
use crate::collection::{get_id, StoreError, StoreResult};
use crate::model::tag::normalize_title;
use crate::model::{now_ms, ItemId, ItemRef, Keyword, KeywordKind, ValidationError};
use crate::relation::RelationGraph;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

/// Normalizes a keyword title; `None` for blank input.
pub fn normalized(kind: KeywordKind, title: &str) -> Option<String> {
    normalize_title(kind, title)
}

/// Keywords collection facade over one connection.
pub struct Keywords<'a> {
    conn: &'a mut Connection,
    kind: KeywordKind,
}

impl<'a> Keywords<'a> {
    pub fn tags(conn: &'a mut Connection) -> Self {
        Self {
            conn,
            kind: KeywordKind::Tag,
        }
    }

    pub fn colors(conn: &'a mut Connection) -> Self {
        Self {
            conn,
            kind: KeywordKind::Color,
        }
    }

    /// Creates the keyword if absent and returns its id.
    pub fn add(&mut self, title: &str) -> StoreResult<ItemId> {
        let Some(title) = normalized(self.kind, title) else {
            return Err(ValidationError::EmptyTitle(self.kind.item_type()).into());
        };
        Self::get_or_create_in(self.conn, self.kind, &title)
    }

    /// Gets one keyword by id.
    pub fn keyword(&self, id: ItemId) -> StoreResult<Option<Keyword>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, title, date_created, date_modified
             FROM keywords WHERE id = ?1 AND kind = ?2;",
        )?;
        let mut rows = stmt.query(params![id.to_string(), self.kind.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_keyword_row(row)?));
        }
        Ok(None)
    }

    /// Lists all keywords of this kind, sorted by title.
    pub fn all(&self) -> StoreResult<Vec<Keyword>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, title, date_created, date_modified
             FROM keywords WHERE kind = ?1 ORDER BY title ASC;",
        )?;
        let mut rows = stmt.query([self.kind.as_str()])?;
        let mut keywords = Vec::new();
        while let Some(row) = rows.next()? {
            keywords.push(parse_keyword_row(row)?);
        }
        Ok(keywords)
    }

    /// Renames a keyword. The new title is normalized.
    pub fn rename(&mut self, id: ItemId, title: &str) -> StoreResult<()> {
        let Some(title) = normalized(self.kind, title) else {
            return Err(ValidationError::EmptyTitle(self.kind.item_type()).into());
        };
        let changed = self.conn.execute(
            "UPDATE keywords SET title = ?2, date_modified = ?3 WHERE id = ?1 AND kind = ?4;",
            params![id.to_string(), title, now_ms(), self.kind.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: self.kind.item_type(),
                id,
            });
        }
        Ok(())
    }

    /// Deletes keywords, unlinks their edges and scrubs their titles out of
    /// notes' denormalized tag/color state. Missing ids are no-ops.
    pub fn remove(&mut self, ids: &[ItemId]) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for id in ids {
            let title: Option<String> = tx
                .query_row(
                    "SELECT title FROM keywords WHERE id = ?1 AND kind = ?2;",
                    params![id.to_string(), self.kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(title) = title else {
                continue;
            };
            scrub_keyword_refs(&tx, self.kind, *id, &title)?;
            tx.execute(
                "DELETE FROM keywords WHERE id = ?1 AND kind = ?2;",
                params![id.to_string(), self.kind.as_str()],
            )?;
            RelationGraph::new(&tx).unlink_all(ItemRef::new(self.kind.item_type(), *id))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Deletes every keyword of this kind with zero relation references.
    /// Returns the number of pruned rows.
    pub fn prune(&mut self) -> StoreResult<usize> {
        let pruned = self.conn.execute(
            "DELETE FROM keywords
             WHERE kind = ?1
               AND NOT EXISTS (
                    SELECT 1 FROM relations
                    WHERE from_type = ?1 AND from_id = keywords.id
               );",
            [self.kind.as_str()],
        )?;
        Ok(pruned)
    }

    /// Transaction-scoped get-or-create used by note tagging/coloring.
    /// Expects an already normalized title.
    pub(crate) fn get_or_create_in(
        conn: &Connection,
        kind: KeywordKind,
        title: &str,
    ) -> StoreResult<ItemId> {
        if let Some(id) = Self::find_in(conn, kind, title)? {
            return Ok(id);
        }
        let id = Uuid::new_v4();
        let now = now_ms();
        conn.execute(
            "INSERT INTO keywords (id, kind, title, date_created, date_modified)
             VALUES (?1, ?2, ?3, ?4, ?4);",
            params![id.to_string(), kind.as_str(), title, now],
        )?;
        Ok(id)
    }

    pub(crate) fn find_in(
        conn: &Connection,
        kind: KeywordKind,
        title: &str,
    ) -> StoreResult<Option<ItemId>> {
        let id_text: Option<String> = conn
            .query_row(
                "SELECT id FROM keywords WHERE kind = ?1 AND title = ?2;",
                params![kind.as_str(), title],
                |row| row.get(0),
            )
            .optional()?;
        match id_text {
            Some(text) => Ok(Some(crate::collection::parse_id(&text, "keywords.id")?)),
            None => Ok(None),
        }
    }
}

pub(crate) fn parse_keyword_row(row: &Row<'_>) -> StoreResult<Keyword> {
    let kind_text: String = row.get("kind")?;
    let kind = KeywordKind::parse(&kind_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid keyword kind `{kind_text}` in keywords.kind"))
    })?;
    Ok(Keyword {
        id: get_id(row, "id")?,
        kind,
        title: row.get("title")?,
        date_created: row.get("date_created")?,
        date_modified: row.get("date_modified")?,
    })
}
