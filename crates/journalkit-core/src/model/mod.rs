// ── Journal domain model ──
//
// Canonical typed values built from decoded replies. Each value records
// the journal it came from.

pub mod day_count;
pub mod entry;
pub mod item_id;
pub mod summary;
pub mod tag;

pub use day_count::DayCounts;
pub use entry::{JournalEntry, Security};
pub use item_id::ItemId;
pub use summary::EntrySummary;
pub use tag::{Tag, TagSet};

use chrono::NaiveDateTime;

/// Anything listed by post time.
pub(crate) trait Posted {
    fn item_id(&self) -> ItemId;
    fn posted_at(&self) -> Option<NaiveDateTime>;

    fn sort_key(&self) -> (Option<NaiveDateTime>, ItemId) {
        (self.posted_at(), self.item_id())
    }
}

impl Posted for JournalEntry {
    fn item_id(&self) -> ItemId {
        self.item_id
    }

    fn posted_at(&self) -> Option<NaiveDateTime> {
        self.posted_at
    }
}

impl Posted for EntrySummary {
    fn item_id(&self) -> ItemId {
        self.item_id
    }

    fn posted_at(&self) -> Option<NaiveDateTime> {
        self.posted_at
    }
}
