//! Generic directed relation graph between `(type, id)` pairs.
//!
//! # Responsibility
//! - Store many-to-many edges for tagging, notebook membership, nesting and
//!   any future link kind in one polymorphic table.
//! - Provide cascade-aware unlink for collection deletes.
//!
//! # Invariants
//! - `add` is idempotent; re-linking an existing edge changes nothing.
//! - Every collection that hard-deletes an entity calls `unlink_all` in the
//!   same transaction, so no edge outlives either endpoint.
//! - Edges carry `date_created` as their only ordering key. There is no
//!   explicit order column, so manual reordering of related items has to be
//!   modeled as delete-then-re-add; this is lossy under concurrent edits and
//!   is a known limitation.

use crate::collection::{parse_id, StoreResult};
use crate::model::{now_ms, ItemRef, ItemType, Relation};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

/// Endpoint filter for [`RelationGraph::unlink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Matches any endpoint.
    Any,
    /// Matches every item of one type.
    Kind(ItemType),
    /// Matches exactly one item.
    Exact(ItemRef),
}

impl Endpoint {
    fn push_clauses(self, side: &str, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Self::Any => {}
            Self::Kind(kind) => {
                sql.push_str(&format!(" AND {side}_type = ?"));
                binds.push(Value::Text(kind.as_str().to_string()));
            }
            Self::Exact(item) => {
                sql.push_str(&format!(" AND {side}_type = ? AND {side}_id = ?"));
                binds.push(Value::Text(item.kind.as_str().to_string()));
                binds.push(Value::Text(item.id.to_string()));
            }
        }
    }
}

/// Edge store facade over one connection (or transaction, via deref).
pub struct RelationGraph<'conn> {
    conn: &'conn Connection,
}

impl<'conn> RelationGraph<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Links `from -> to`. Idempotent.
    pub fn add(&self, from: ItemRef, to: ItemRef) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO relations (from_type, from_id, to_type, to_id, date_created)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                from.kind.as_str(),
                from.id.to_string(),
                to.kind.as_str(),
                to.id.to_string(),
                now_ms(),
            ],
        )?;
        Ok(())
    }

    /// Removes every edge matching the from/to filter pair. Returns the
    /// number of deleted edges.
    pub fn unlink(&self, from: Endpoint, to: Endpoint) -> StoreResult<usize> {
        let mut sql = String::from("DELETE FROM relations WHERE 1 = 1");
        let mut binds: Vec<Value> = Vec::new();
        from.push_clauses("from", &mut sql, &mut binds);
        to.push_clauses("to", &mut sql, &mut binds);
        let deleted = self.conn.execute(&sql, params_from_iter(binds))?;
        Ok(deleted)
    }

    /// Removes every edge mentioning `item` on either side.
    ///
    /// Called by collection deletes inside the deleting transaction.
    pub fn unlink_all(&self, item: ItemRef) -> StoreResult<usize> {
        let outgoing = self.unlink(Endpoint::Exact(item), Endpoint::Any)?;
        let incoming = self.unlink(Endpoint::Any, Endpoint::Exact(item))?;
        Ok(outgoing + incoming)
    }

    /// Ids of type `to_type` linked from `from`, ordered by link age.
    pub fn from_refs(&self, from: ItemRef, to_type: ItemType) -> StoreResult<Vec<ItemRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT to_id FROM relations
             WHERE from_type = ?1 AND from_id = ?2 AND to_type = ?3
             ORDER BY date_created ASC, to_id ASC;",
        )?;
        let mut rows = stmt.query(params![
            from.kind.as_str(),
            from.id.to_string(),
            to_type.as_str()
        ])?;
        let mut refs = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            refs.push(ItemRef::new(to_type, parse_id(&id_text, "relations.to_id")?));
        }
        Ok(refs)
    }

    /// Ids of type `from_type` linking to `to`, ordered by link age.
    pub fn to_refs(&self, to: ItemRef, from_type: ItemType) -> StoreResult<Vec<ItemRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_id FROM relations
             WHERE to_type = ?1 AND to_id = ?2 AND from_type = ?3
             ORDER BY date_created ASC, from_id ASC;",
        )?;
        let mut rows = stmt.query(params![
            to.kind.as_str(),
            to.id.to_string(),
            from_type.as_str()
        ])?;
        let mut refs = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            refs.push(ItemRef::new(
                from_type,
                parse_id(&id_text, "relations.from_id")?,
            ));
        }
        Ok(refs)
    }

    /// Whether the exact edge `from -> to` exists.
    pub fn has(&self, from: ItemRef, to: ItemRef) -> StoreResult<bool> {
        crate::collection::row_exists(
            self.conn,
            "SELECT EXISTS(
                SELECT 1 FROM relations
                WHERE from_type = ?1 AND from_id = ?2 AND to_type = ?3 AND to_id = ?4
            );",
            params![
                from.kind.as_str(),
                from.id.to_string(),
                to.kind.as_str(),
                to.id.to_string()
            ],
        )
    }

    /// Number of edges pointing at `to` from any type.
    pub fn reference_count(&self, to: ItemRef) -> StoreResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM relations WHERE to_type = ?1 AND to_id = ?2;",
            params![to.kind.as_str(), to.id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All edges mentioning `item` on either side.
    pub fn edges_of(&self, item: ItemRef) -> StoreResult<Vec<Relation>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_type, from_id, to_type, to_id, date_created FROM relations
             WHERE (from_type = ?1 AND from_id = ?2) OR (to_type = ?1 AND to_id = ?2)
             ORDER BY date_created ASC;",
        )?;
        let mut rows = stmt.query(params![item.kind.as_str(), item.id.to_string()])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_relation_row(row)?);
        }
        Ok(edges)
    }
}

fn parse_relation_row(row: &rusqlite::Row<'_>) -> StoreResult<Relation> {
    let from_type: String = row.get("from_type")?;
    let from_id: String = row.get("from_id")?;
    let to_type: String = row.get("to_type")?;
    let to_id: String = row.get("to_id")?;
    let parse_type = |value: &str, column: &str| {
        ItemType::parse(value).ok_or_else(|| {
            crate::collection::StoreError::InvalidData(format!(
                "invalid item type `{value}` in {column}"
            ))
        })
    };
    Ok(Relation {
        from: ItemRef::new(
            parse_type(&from_type, "relations.from_type")?,
            parse_id(&from_id, "relations.from_id")?,
        ),
        to: ItemRef::new(
            parse_type(&to_type, "relations.to_type")?,
            parse_id(&to_id, "relations.to_id")?,
        ),
        date_created: row.get("date_created")?,
    })
}
