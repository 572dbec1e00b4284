//! Collections: the CRUD-plus-policy layer, one module per entity type.
//!
//! # Responsibility
//! - Validate mutation input and apply field-level patch semantics.
//! - Keep entity rows, relation edges and denormalized lists consistent
//!   inside single transactions.
//!
//! # Invariants
//! - Any mutation touching more than one table runs in one transaction.
//! - `remove` is idempotent: missing ids are no-ops, never errors.
//! - Write paths validate before the first SQL statement, so a validation
//!   error implies no partial write.

use crate::codec::DecryptionError;
use crate::db::DbError;
use crate::entitlement::Entitlement;
use crate::model::{ItemId, ItemType, ValidationError};
use rusqlite::{Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod keywords;
pub mod monographs;
pub mod notebooks;
pub mod notes;
pub mod reminders;
pub mod trash;

pub use keywords::Keywords;
pub use monographs::Monographs;
pub use notebooks::Notebooks;
pub use notes::Notes;
pub use reminders::Reminders;
pub use trash::{Trash, TrashItem};

pub type StoreResult<T> = Result<T, StoreError>;

/// Error taxonomy shared by every collection operation.
#[derive(Debug)]
pub enum StoreError {
    /// Malformed input to a mutation; nothing was written.
    Validation(ValidationError),
    /// The operation required an existing row that is absent.
    NotFound { kind: ItemType, id: ItemId },
    /// Codec failure on one item; fatal for that item only.
    Decryption(DecryptionError),
    /// An automatic merge hit content that is already conflicted; the merge
    /// is deferred, never destructive.
    ConflictState(ItemId),
    /// A plan-gated operation was attempted without the entitlement.
    EntitlementDenied(Entitlement),
    /// Storage failure; the surrounding transaction rolled back fully.
    Db(DbError),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Decryption(err) => write!(f, "{err}"),
            Self::ConflictState(id) => {
                write!(f, "content {id} is conflicted; merge deferred until resolved")
            }
            Self::EntitlementDenied(entitlement) => {
                write!(f, "operation requires entitlement: {entitlement}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Decryption(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DecryptionError> for StoreError {
    fn from(value: DecryptionError) -> Self {
        Self::Decryption(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_id(value: &str, column: &str) -> StoreResult<ItemId> {
    uuid::Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn get_id(row: &Row<'_>, column: &str) -> StoreResult<ItemId> {
    let text: String = row.get(column)?;
    parse_id(&text, column)
}

pub(crate) fn get_bool(row: &Row<'_>, column: &str) -> StoreResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

/// Decodes a denormalized JSON string-list column.
pub(crate) fn decode_string_list(raw: &str, column: &str) -> StoreResult<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::InvalidData(format!("invalid JSON list in {column}: {err}")))
}

pub(crate) fn encode_string_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn row_exists(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(exists == 1)
}
