// ── Journal index ──
//
// Retrieval and local indexing for one journal. Every query dispatches
// through the shared `Account`, converts the reply into typed values and
// caches them by item id. Replies themselves are never kept.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use tracing::{debug, info};

use journalkit_api::{Account, FlatValue, Params, ReplyMap};

use crate::config::JournalOptions;
use crate::convert::{self, EVENT_TIME_FORMAT};
use crate::error::CoreError;
use crate::model::{DayCounts, EntrySummary, ItemId, JournalEntry, Posted, Tag, TagSet};
use crate::store::ItemCache;

/// Which events a `getevents` request selects.
#[derive(Debug, Clone, Copy)]
enum Selection {
    Item(ItemId),
    Latest,
    LastN {
        howmany: u32,
        before: Option<NaiveDateTime>,
    },
    Day(NaiveDate),
}

impl Selection {
    fn apply(self, params: &mut Params) {
        match self {
            Self::Item(id) => {
                params.insert("selecttype".into(), "one".into());
                params.insert("itemid".into(), id.get().into());
            }
            Self::Latest => {
                params.insert("selecttype".into(), "one".into());
                params.insert("itemid".into(), FlatValue::from(-1_i64));
            }
            Self::LastN { howmany, before } => {
                params.insert("selecttype".into(), "lastn".into());
                params.insert("howmany".into(), howmany.into());
                if let Some(before) = before {
                    params.insert(
                        "beforedate".into(),
                        before.format(EVENT_TIME_FORMAT).to_string().into(),
                    );
                }
            }
            Self::Day(day) => {
                params.insert("selecttype".into(), "day".into());
                params.insert("year".into(), day.year().into());
                params.insert("month".into(), day.month().into());
                params.insert("day".into(), day.day().into());
            }
        }
    }
}

/// Retrieval and caching for a single journal.
///
/// The journal is either the account owner's own (`is_default`) or a
/// shared journal the account may read; requests for the latter carry
/// `usejournal`.
pub struct JournalIndex {
    account: Arc<Account>,
    name: String,
    summary_length: AtomicU32,
    entries: ItemCache<JournalEntry>,
    summaries: ItemCache<EntrySummary>,
    tags: RwLock<TagSet>,
    tag_details: DashMap<String, Arc<Tag>>,
}

impl JournalIndex {
    pub fn new(account: Arc<Account>, name: impl Into<String>, options: &JournalOptions) -> Self {
        Self {
            account,
            name: name.into(),
            summary_length: AtomicU32::new(options.summary_length),
            entries: ItemCache::new(),
            summaries: ItemCache::new(),
            tags: RwLock::new(TagSet::new()),
            tag_details: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` for the account owner's own journal.
    pub fn is_default(&self) -> bool {
        self.name == self.account.username()
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    pub fn summary_length(&self) -> u32 {
        self.summary_length.load(Ordering::Relaxed)
    }

    /// Change the summary length. Cached summaries were cut to the old
    /// length, so they are dropped.
    pub fn set_summary_length(&self, length: u32) {
        let previous = self.summary_length.swap(length, Ordering::Relaxed);
        if previous != length {
            self.summaries.clear();
        }
    }

    // ── Entries ──────────────────────────────────────────────────────

    /// The entry with `item_id`, from cache when possible.
    pub async fn entry(&self, item_id: ItemId) -> Result<Arc<JournalEntry>, CoreError> {
        if let Some(entry) = self.entries.get(item_id) {
            return Ok(entry);
        }
        self.fetch_entries(Selection::Item(item_id))
            .await?
            .into_iter()
            .find(|e| e.item_id == item_id)
            .ok_or_else(|| self.not_found(item_id))
    }

    /// The newest entry, or `None` for an empty journal.
    pub async fn most_recent_entry(&self) -> Result<Option<Arc<JournalEntry>>, CoreError> {
        let entries = self.fetch_entries(Selection::Latest).await?;
        Ok(newest_first(entries, None, 1).into_iter().next())
    }

    /// Up to `n` entries posted strictly before `before` (when given),
    /// newest first.
    pub async fn entries_last_n(
        &self,
        n: u32,
        before: Option<NaiveDateTime>,
    ) -> Result<Vec<Arc<JournalEntry>>, CoreError> {
        validate_count(n)?;
        let entries = self
            .fetch_entries(Selection::LastN { howmany: n, before })
            .await?;
        Ok(newest_first(entries, before, n))
    }

    /// Entries posted on `day`, oldest first.
    pub async fn entries_for_day(&self, day: NaiveDate) -> Result<Vec<Arc<JournalEntry>>, CoreError> {
        let entries = self.fetch_entries(Selection::Day(day)).await?;
        Ok(on_day(entries, day))
    }

    /// A previously fetched entry, without contacting the server.
    pub fn cached_entry(&self, item_id: ItemId) -> Option<Arc<JournalEntry>> {
        self.entries.get(item_id)
    }

    /// Every cached entry, by item id.
    pub fn cached_entries(&self) -> Vec<Arc<JournalEntry>> {
        self.entries.snapshot()
    }

    // ── Summaries ────────────────────────────────────────────────────

    /// The summary of `item_id`. A cached full entry is summarized locally.
    pub async fn summary(&self, item_id: ItemId) -> Result<Arc<EntrySummary>, CoreError> {
        if let Some(summary) = self.summaries.get(item_id) {
            return Ok(summary);
        }
        if let Some(entry) = self.entries.get(item_id) {
            let summary = summarize(&entry, self.summary_length());
            return Ok(self.summaries.insert(item_id, summary));
        }
        self.fetch_summaries(Selection::Item(item_id))
            .await?
            .into_iter()
            .find(|s| s.item_id == item_id)
            .ok_or_else(|| self.not_found(item_id))
    }

    pub async fn most_recent_summary(&self) -> Result<Option<Arc<EntrySummary>>, CoreError> {
        let summaries = self.fetch_summaries(Selection::Latest).await?;
        Ok(newest_first(summaries, None, 1).into_iter().next())
    }

    pub async fn summaries_last_n(
        &self,
        n: u32,
        before: Option<NaiveDateTime>,
    ) -> Result<Vec<Arc<EntrySummary>>, CoreError> {
        validate_count(n)?;
        let summaries = self
            .fetch_summaries(Selection::LastN { howmany: n, before })
            .await?;
        Ok(newest_first(summaries, before, n))
    }

    pub async fn summaries_for_day(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<Arc<EntrySummary>>, CoreError> {
        let summaries = self.fetch_summaries(Selection::Day(day)).await?;
        Ok(on_day(summaries, day))
    }

    // ── Day counts & tags ────────────────────────────────────────────

    /// Number of entries per day over the whole journal.
    pub async fn day_counts(&self) -> Result<DayCounts, CoreError> {
        let reply = self.dispatch("getdaycounts", self.base_params()).await?;
        let counts = convert::day_counts_from_reply(&reply)?;
        debug!(journal = %self.name, days = counts.len(), "fetched day counts");
        Ok(counts)
    }

    /// Snapshot of the known tag names.
    pub fn tags(&self) -> TagSet {
        self.tags.read().expect("tag set lock poisoned").clone()
    }

    /// Record `tag` if it is not already known. Returns `true` if added.
    pub fn update_tags_array(&self, tag: &str) -> bool {
        self.tags
            .write()
            .expect("tag set lock poisoned")
            .insert(tag)
    }

    /// Server details for `name`, once tags have been loaded.
    pub fn tag(&self, name: &str) -> Option<Arc<Tag>> {
        self.tag_details.get(name).map(|r| Arc::clone(r.value()))
    }

    /// The raw `gettags` reply.
    pub async fn tags_reply(&self) -> Result<ReplyMap, CoreError> {
        self.dispatch("gettags", self.base_params()).await
    }

    /// Replace the known tags with those in a `gettags` reply. Returns the
    /// number of tags parsed.
    pub fn create_journal_tags_array(&self, reply: &ReplyMap) -> Result<usize, CoreError> {
        let parsed = convert::tags_from_reply(&self.name, reply)?;
        let names: TagSet = parsed.iter().map(|t| t.name.clone()).collect();

        *self.tags.write().expect("tag set lock poisoned") = names;
        self.tag_details.clear();
        for tag in &parsed {
            self.tag_details
                .insert(tag.name.clone(), Arc::new(tag.clone()));
        }

        debug!(journal = %self.name, count = parsed.len(), "replaced tag set");
        Ok(parsed.len())
    }

    /// Fetch the journal's tags and replace the local set.
    pub async fn refresh_tags(&self) -> Result<usize, CoreError> {
        let reply = self.tags_reply().await?;
        self.create_journal_tags_array(&reply)
    }

    /// Drop cached entries and summaries so the next query re-fetches.
    pub fn clear_cache(&self) {
        self.entries.clear();
        self.summaries.clear();
        info!(journal = %self.name, "cleared journal cache");
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn base_params(&self) -> Params {
        let mut params = Params::new();
        if !self.is_default() {
            params.insert("usejournal".into(), self.name.as_str().into());
        }
        params
    }

    fn event_params(&self, selection: Selection) -> Params {
        let mut params = self.base_params();
        params.insert("lineendings".into(), "unix".into());
        selection.apply(&mut params);
        params
    }

    async fn dispatch(&self, mode: &str, params: Params) -> Result<ReplyMap, CoreError> {
        Ok(self.account.dispatch(mode, &params).await?)
    }

    async fn fetch_entries(&self, selection: Selection) -> Result<Vec<Arc<JournalEntry>>, CoreError> {
        let reply = self
            .dispatch("getevents", self.event_params(selection))
            .await?;
        let entries = convert::entries_from_reply(&self.name, &reply)?;
        debug!(
            journal = %self.name,
            ?selection,
            fetched = entries.len(),
            cached = self.entries.len(),
            "fetched entries"
        );
        Ok(entries
            .into_iter()
            .map(|e| self.entries.insert(e.item_id, e))
            .collect())
    }

    async fn fetch_summaries(
        &self,
        selection: Selection,
    ) -> Result<Vec<Arc<EntrySummary>>, CoreError> {
        let length = self.summary_length();
        let mut params = self.event_params(selection);
        params.insert("truncate".into(), length.into());
        params.insert("prefersubject".into(), "0".into());
        params.insert("noprops".into(), "1".into());

        let reply = self.dispatch("getevents", params).await?;
        let summaries = convert::summaries_from_reply(&self.name, &reply, length)?;
        debug!(
            journal = %self.name,
            ?selection,
            fetched = summaries.len(),
            "fetched summaries"
        );
        Ok(summaries
            .into_iter()
            .map(|s| self.summaries.insert(s.item_id, s))
            .collect())
    }

    fn not_found(&self, item_id: ItemId) -> CoreError {
        CoreError::EntryNotFound {
            journal: self.name.clone(),
            item_id,
        }
    }
}

// ── Ordering ─────────────────────────────────────────────────────────

fn validate_count(n: u32) -> Result<(), CoreError> {
    if n == 0 {
        return Err(CoreError::Validation {
            message: "entry count must be at least 1".into(),
        });
    }
    Ok(())
}

/// Newest first, strictly before `before`, at most `n`, one per item id.
fn newest_first<T: Posted>(
    mut items: Vec<Arc<T>>,
    before: Option<NaiveDateTime>,
    n: u32,
) -> Vec<Arc<T>> {
    if let Some(before) = before {
        items.retain(|item| item.posted_at().is_some_and(|t| t < before));
    }
    dedup(&mut items);
    items.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    items.truncate(usize::try_from(n).unwrap_or(usize::MAX));
    items
}

/// Only items posted on `day`, oldest first.
fn on_day<T: Posted>(mut items: Vec<Arc<T>>, day: NaiveDate) -> Vec<Arc<T>> {
    items.retain(|item| item.posted_at().is_some_and(|t| t.date() == day));
    dedup(&mut items);
    items.sort_by_key(|item| item.sort_key());
    items
}

/// Keep the first occurrence of each item id.
fn dedup<T: Posted>(items: &mut Vec<Arc<T>>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.item_id()));
}

fn summarize(entry: &JournalEntry, length: u32) -> EntrySummary {
    EntrySummary {
        journal: entry.journal.clone(),
        item_id: entry.item_id,
        subject: entry.subject.clone(),
        summary: convert::truncate_chars(&entry.body, length),
        posted_at: entry.posted_at,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(id: u32, time: &str) -> Arc<EntrySummary> {
        Arc::new(EntrySummary {
            journal: "frank".into(),
            item_id: ItemId::new(id),
            subject: None,
            summary: String::new(),
            posted_at: Some(NaiveDateTime::parse_from_str(time, EVENT_TIME_FORMAT).unwrap()),
        })
    }

    fn ids<T: Posted>(items: &[Arc<T>]) -> Vec<u32> {
        items.iter().map(|i| i.item_id().get()).collect()
    }

    #[test]
    fn newest_first_breaks_ties_by_item_id() {
        let items = vec![
            at(1, "2003-01-02 10:00:00"),
            at(3, "2003-01-02 10:00:00"),
            at(2, "2003-01-03 09:00:00"),
        ];
        assert_eq!(ids(&newest_first(items, None, 10)), vec![2, 3, 1]);
    }

    #[test]
    fn newest_first_filters_strictly_and_truncates() {
        let before = NaiveDateTime::parse_from_str("2003-01-03 09:00:00", EVENT_TIME_FORMAT).unwrap();
        let items = vec![
            at(1, "2003-01-01 10:00:00"),
            at(2, "2003-01-03 09:00:00"),
            at(3, "2003-01-02 10:00:00"),
            at(3, "2003-01-02 10:00:00"),
        ];
        assert_eq!(ids(&newest_first(items, Some(before), 5)), vec![3, 1]);

        let items = vec![at(1, "2003-01-01 10:00:00"), at(2, "2003-01-02 10:00:00")];
        assert_eq!(ids(&newest_first(items, None, 1)), vec![2]);
    }

    #[test]
    fn on_day_keeps_only_that_day_ascending() {
        let day = NaiveDate::from_ymd_opt(2003, 1, 2).unwrap();
        let items = vec![
            at(4, "2003-01-02 23:59:59"),
            at(5, "2003-01-03 00:00:00"),
            at(2, "2003-01-02 08:00:00"),
        ];
        assert_eq!(ids(&on_day(items, day)), vec![2, 4]);
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(matches!(validate_count(0), Err(CoreError::Validation { .. })));
        assert!(validate_count(1).is_ok());
    }

    #[test]
    fn day_selection_sends_calendar_fields() {
        let mut params = Params::new();
        Selection::Day(NaiveDate::from_ymd_opt(2003, 1, 2).unwrap()).apply(&mut params);
        assert_eq!(params["selecttype"].as_str(), Some("day"));
        assert_eq!(params["year"].as_str(), Some("2003"));
        assert_eq!(params["month"].as_str(), Some("1"));
        assert_eq!(params["day"].as_str(), Some("2"));
    }
}
