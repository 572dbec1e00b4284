//! Tokenized substring lookup over item titles.
//!
//! # Responsibility
//! - Turn free text into AND-combined substring filters and run them as
//!   native `LIKE` predicates, never by scanning rows in process.
//!
//! # Invariants
//! - An item matches iff every whitespace-separated token occurs in its
//!   indexed text (title, or title plus excerpt for notes), case-insensitive.
//! - Blank queries return nothing. Trashed items never match.
//! - Results order by last modification, newest first.

use crate::collection::{get_id, StoreResult};
use crate::model::{ItemId, ItemType};
use rusqlite::{Connection, ToSql};

const LIKE_ESCAPE: char = '\\';

/// Finds items of `kind` matching every token of `text`.
pub fn lookup(conn: &Connection, text: &str, kind: ItemType) -> StoreResult<Vec<ItemId>> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let (indexed, base) = match kind {
        ItemType::Note => (
            "lower(title || ' ' || coalesce(excerpt, ''))",
            "FROM notes WHERE deleted = 0",
        ),
        ItemType::Notebook => ("lower(title)", "FROM notebooks WHERE deleted = 0"),
        ItemType::Tag => ("lower(title)", "FROM keywords WHERE kind = 'tag'"),
        ItemType::Color => ("lower(title)", "FROM keywords WHERE kind = 'color'"),
        ItemType::Reminder => (
            "lower(title || ' ' || coalesce(description, ''))",
            "FROM reminders WHERE 1 = 1",
        ),
        // Monographs have no text of their own; callers look up the note.
        ItemType::Monograph => return Ok(Vec::new()),
    };

    let mut sql = format!("SELECT id {base}");
    let mut params: Vec<Box<dyn ToSql>> = Vec::with_capacity(tokens.len());
    for (position, token) in tokens.iter().enumerate() {
        sql.push_str(&format!(
            " AND {indexed} LIKE ?{} ESCAPE '{LIKE_ESCAPE}'",
            position + 1
        ));
        params.push(Box::new(format!("%{}%", escape_like(token))));
    }
    sql.push_str(" ORDER BY date_modified DESC, id ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(
        params.iter().map(|p| p.as_ref()),
    ))?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(get_id(row, "id")?);
    }
    Ok(ids)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|token| token.to_lowercase())
        .collect()
}

fn escape_like(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len());
    for c in token.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
