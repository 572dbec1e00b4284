//! Monograph model: the published-note record.
//!
//! A monograph row exists iff its note is currently published; its id is the
//! note id, so publish is an upsert and unpublish is a point delete.

use super::ItemId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monograph {
    /// Equal to the published note's id.
    pub note_id: ItemId,
    pub published_at: i64,
    /// Password protection on the public page, if any.
    pub password: Option<String>,
    /// Unpublish automatically after first view.
    pub self_destruct: bool,
}

/// Options for `Monographs::publish`.
#[derive(Debug, Clone, Default)]
pub struct MonographOptions {
    pub password: Option<String>,
    pub self_destruct: bool,
}
