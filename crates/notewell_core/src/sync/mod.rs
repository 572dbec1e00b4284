//! Sync merge path: wire item shapes, the transport seam and the merger.
//!
//! # Responsibility
//! - Define what crosses the wire (`RemoteItem`) and the transport trait the
//!   host implements; the engine never speaks a protocol itself.
//!
//! # Invariants
//! - Payload bytes are codec-opaque; the engine decodes them only through
//!   the configured `ContentCodec`.
//! - No transaction is ever held across a transport call.

use crate::collection::StoreError;
use crate::model::ItemId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

pub mod merger;

pub use merger::{MergeReport, Merger, SyncReport};

/// Wire-level item type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Note,
    Notebook,
    Tag,
    Color,
    Reminder,
    Relation,
    Monograph,
    Content,
}

impl SyncKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncKind::Note => "note",
            SyncKind::Notebook => "notebook",
            SyncKind::Tag => "tag",
            SyncKind::Color => "color",
            SyncKind::Reminder => "reminder",
            SyncKind::Relation => "relation",
            SyncKind::Monograph => "monograph",
            SyncKind::Content => "content",
        }
    }
}

/// One synced item as pulled from or pushed to the remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteItem {
    pub kind: SyncKind,
    pub id: ItemId,
    /// Codec-opaque bytes; the merger decodes them per `kind`.
    pub payload: Vec<u8>,
    pub date_modified: i64,
    pub session_id: i64,
    pub deleted: bool,
}

/// What the remote accepted from one push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub accepted: usize,
    pub server_time: i64,
}

/// Transport failure, outside the engine's control.
#[derive(Debug)]
pub enum TransportError {
    Offline(String),
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Offline(detail) => write!(f, "transport offline: {detail}"),
            TransportError::Protocol(detail) => write!(f, "transport protocol error: {detail}"),
        }
    }
}

impl Error for TransportError {}

/// The host-provided wire. Pull returns batches; the merger commits one
/// transaction per batch, after the network wait.
pub trait SyncTransport {
    fn pull(&mut self, since_ms: i64) -> Result<Vec<Vec<RemoteItem>>, TransportError>;
    fn push(&mut self, items: &[RemoteItem]) -> Result<PushOutcome, TransportError>;
}

/// A full sync run can fail on either side of the seam.
#[derive(Debug)]
pub enum SyncError {
    Transport(TransportError),
    Store(StoreError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Transport(err) => write!(f, "{err}"),
            SyncError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::Transport(err) => Some(err),
            SyncError::Store(err) => Some(err),
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        SyncError::Transport(err)
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
