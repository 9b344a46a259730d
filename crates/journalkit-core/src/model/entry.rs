// ── Entry domain types ──

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::item_id::ItemId;

/// Who may read an entry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Security {
    #[default]
    Public,
    Private,
    /// Visible to the friend groups in `allow_mask`.
    UseMask,
}

/// A full journal entry.
///
/// Post times are journal-local wall-clock times as the server stores
/// them; they carry no timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Name of the journal the entry belongs to.
    pub journal: String,
    pub item_id: ItemId,
    /// Random suffix the server mixes into the public id.
    pub anum: Option<u32>,
    pub subject: Option<String>,
    pub body: String,
    pub posted_at: Option<NaiveDateTime>,
    pub security: Security,
    pub allow_mask: Option<u32>,
    /// Set when someone other than the journal owner posted (communities).
    pub poster: Option<String>,
    /// Server-side properties (`current_mood`, `taglist`, ...).
    pub metadata: BTreeMap<String, String>,
}

impl JournalEntry {
    /// The id that appears in the entry's web URL.
    pub fn public_item_id(&self) -> Option<u64> {
        self.anum
            .map(|anum| u64::from(self.item_id.get()) * 256 + u64::from(anum))
    }

    /// Calendar day of the post.
    pub fn posted_on(&self) -> Option<NaiveDate> {
        self.posted_at.map(|t| t.date())
    }

    /// Tags recorded in the entry's `taglist` property.
    pub fn tags(&self) -> Vec<&str> {
        self.metadata
            .get("taglist")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
