// ── Entry summary ──

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::item_id::ItemId;

/// A lightweight view of an entry: subject plus a truncated body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub journal: String,
    pub item_id: ItemId,
    pub subject: Option<String>,
    /// Body cut to the index's summary length, in characters.
    pub summary: String,
    pub posted_at: Option<NaiveDateTime>,
}
