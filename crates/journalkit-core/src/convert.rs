// ── Reply-to-domain conversions ──
//
// Builds typed model values from decoded `ReplyMap`s. Each builder takes
// the journal name plus the reply fragment for one item, parses strings
// into strong types, and leaves optional fields empty when the server
// omits them. Missing required fields are parse errors.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{trace, warn};

use journalkit_api::{FlatValue, Record, ReplyMap};

use crate::error::CoreError;
use crate::model::{DayCounts, EntrySummary, ItemId, JournalEntry, Security, Tag};

/// Layout of `eventtime` values.
pub(crate) const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layout of the day keys in a `getdaycounts` reply.
const DAY_FORMAT: &str = "%Y-%m-%d";

// ── Helpers ────────────────────────────────────────────────────────

fn text<'a>(fragment: &'a Record, key: &str) -> Option<&'a str> {
    fragment.get(key).and_then(FlatValue::as_str)
}

/// Non-empty text value, owned.
fn owned(fragment: &Record, key: &str) -> Option<String> {
    text(fragment, key)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn parse_item_id(fragment: &Record) -> Result<ItemId, CoreError> {
    let raw = text(fragment, "itemid").ok_or_else(|| CoreError::parse("entry without itemid"))?;
    raw.parse()
        .map_err(|e| CoreError::parse(format!("bad itemid {raw:?}: {e}")))
}

fn parse_number<T: std::str::FromStr>(fragment: &Record, key: &str) -> Option<T> {
    text(fragment, key).and_then(|s| s.trim().parse().ok())
}

/// Parse an `eventtime`, dropping values the server sent in another layout.
pub(crate) fn parse_event_time(raw: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(raw.trim(), EVENT_TIME_FORMAT) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!(value = raw, error = %e, "unparseable event time");
            None
        }
    }
}

fn parse_security(fragment: &Record) -> Security {
    match text(fragment, "security") {
        None | Some("") => Security::Public,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(value = raw, "unknown security level, treating as private");
            Security::Private
        }),
    }
}

/// Event text arrives form-encoded (`+` for space, `%2B` for a literal
/// plus). Text that is not valid encoding is kept as sent.
fn decode_body(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!(error = %e, "event body is not valid percent-encoding; keeping raw text");
            raw.to_owned()
        }
    }
}

/// The records of list `key`; a reply without the list has none.
fn records<'a>(reply: &'a ReplyMap, key: &str) -> Result<Vec<&'a Record>, CoreError> {
    let Some(value) = reply.get(key) else {
        return Ok(Vec::new());
    };
    let list = value
        .as_list()
        .ok_or_else(|| CoreError::parse(format!("`{key}` is not a list")))?;
    list.iter()
        .map(|item| {
            item.as_record()
                .ok_or_else(|| CoreError::parse(format!("`{key}` element is not a record")))
        })
        .collect()
}

// ── Entries ─────────────────────────────────────────────────────────

impl JournalEntry {
    /// Build an entry from one `events` element.
    pub fn from_fragment(journal: &str, fragment: &Record) -> Result<Self, CoreError> {
        let item_id = parse_item_id(fragment)?;
        Ok(Self {
            journal: journal.to_owned(),
            item_id,
            anum: parse_number(fragment, "anum"),
            subject: owned(fragment, "subject"),
            body: text(fragment, "event").map(decode_body).unwrap_or_default(),
            posted_at: text(fragment, "eventtime").and_then(parse_event_time),
            security: parse_security(fragment),
            allow_mask: parse_number(fragment, "allowmask"),
            poster: owned(fragment, "poster"),
            metadata: BTreeMap::new(),
        })
    }
}

impl EntrySummary {
    /// Build a summary from one `events` element, cutting the body to
    /// `length` characters.
    pub fn from_fragment(journal: &str, fragment: &Record, length: u32) -> Result<Self, CoreError> {
        let item_id = parse_item_id(fragment)?;
        let body = text(fragment, "event").map(decode_body).unwrap_or_default();
        Ok(Self {
            journal: journal.to_owned(),
            item_id,
            subject: owned(fragment, "subject"),
            summary: truncate_chars(&body, length),
            posted_at: text(fragment, "eventtime").and_then(parse_event_time),
        })
    }
}

pub(crate) fn truncate_chars(body: &str, length: u32) -> String {
    let limit = usize::try_from(length).unwrap_or(usize::MAX);
    body.chars().take(limit).collect()
}

/// Group the `prop` list by item id.
fn props_by_item(reply: &ReplyMap) -> Result<BTreeMap<ItemId, BTreeMap<String, String>>, CoreError> {
    let mut props: BTreeMap<ItemId, BTreeMap<String, String>> = BTreeMap::new();
    for prop in records(reply, "prop")? {
        let (Some(name), Some(value)) = (text(prop, "name"), text(prop, "value")) else {
            trace!("skipping incomplete prop record");
            continue;
        };
        let item_id = parse_item_id(prop)?;
        props
            .entry(item_id)
            .or_default()
            .insert(name.to_owned(), value.to_owned());
    }
    Ok(props)
}

/// All entries in a `getevents` reply, with their props attached.
pub(crate) fn entries_from_reply(
    journal: &str,
    reply: &ReplyMap,
) -> Result<Vec<JournalEntry>, CoreError> {
    let mut props = props_by_item(reply)?;
    records(reply, "events")?
        .into_iter()
        .map(|fragment| {
            let mut entry = JournalEntry::from_fragment(journal, fragment)?;
            if let Some(metadata) = props.remove(&entry.item_id) {
                entry.metadata = metadata;
            }
            Ok(entry)
        })
        .collect()
}

/// All summaries in a `getevents` reply.
pub(crate) fn summaries_from_reply(
    journal: &str,
    reply: &ReplyMap,
    length: u32,
) -> Result<Vec<EntrySummary>, CoreError> {
    records(reply, "events")?
        .into_iter()
        .map(|fragment| EntrySummary::from_fragment(journal, fragment, length))
        .collect()
}

// ── Tags ────────────────────────────────────────────────────────────

impl Tag {
    /// Build a tag from one `tag` element of a `gettags` reply.
    pub fn from_fragment(journal: &str, fragment: &Record) -> Result<Self, CoreError> {
        let name = owned(fragment, "name").ok_or_else(|| CoreError::parse("tag without name"))?;
        Ok(Self {
            journal: journal.to_owned(),
            name,
            uses: parse_number(fragment, "uses"),
            display: text(fragment, "display").is_none_or(|d| d == "1"),
            security: owned(fragment, "security"),
        })
    }
}

pub(crate) fn tags_from_reply(journal: &str, reply: &ReplyMap) -> Result<Vec<Tag>, CoreError> {
    records(reply, "tag")?
        .into_iter()
        .map(|fragment| Tag::from_fragment(journal, fragment))
        .collect()
}

// ── Day counts ──────────────────────────────────────────────────────

/// Every `YYYY-MM-DD` key of a `getdaycounts` reply. Other keys
/// (`success`, ...) are not days and are skipped.
pub(crate) fn day_counts_from_reply(reply: &ReplyMap) -> Result<DayCounts, CoreError> {
    let mut counts = DayCounts::default();
    for (key, value) in reply {
        let Ok(day) = NaiveDate::parse_from_str(key, DAY_FORMAT) else {
            continue;
        };
        let raw = value
            .as_str()
            .ok_or_else(|| CoreError::parse(format!("count for {key} is not a scalar")))?;
        let count: u32 = raw
            .trim()
            .parse()
            .map_err(|e| CoreError::parse(format!("bad count {raw:?} for {key}: {e}")))?;
        counts.insert(day, count);
    }
    Ok(counts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use journalkit_api::{Framing, codec::decode};
    use pretty_assertions::assert_eq;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), FlatValue::from(*v)))
            .collect()
    }

    fn lines(pairs: &[(&str, &str)]) -> ReplyMap {
        let body: String = pairs.iter().map(|(k, v)| format!("{k}\n{v}\n")).collect();
        decode(body.as_bytes(), Framing::Lines).unwrap()
    }

    #[test]
    fn entry_from_minimal_fragment() {
        let fragment = record(&[("itemid", "42"), ("subject", "Hi"), ("event", "Body text")]);
        let entry = JournalEntry::from_fragment("frank", &fragment).unwrap();

        assert_eq!(entry.item_id, ItemId::new(42));
        assert_eq!(entry.subject.as_deref(), Some("Hi"));
        assert_eq!(entry.body, "Body text");
        assert_eq!(entry.journal, "frank");
        assert_eq!(entry.security, Security::Public);
        assert!(entry.posted_at.is_none());
    }

    #[test]
    fn entry_body_is_percent_decoded() {
        let fragment = record(&[
            ("itemid", "1"),
            ("event", "tea%20and%0Abiscuits"),
            ("eventtime", "2003-01-02 15:04:05"),
            ("security", "usemask"),
            ("allowmask", "1"),
        ]);
        let entry = JournalEntry::from_fragment("frank", &fragment).unwrap();

        assert_eq!(entry.body, "tea and\nbiscuits");
        assert_eq!(
            entry.posted_at.unwrap().to_string(),
            "2003-01-02 15:04:05"
        );
        assert_eq!(entry.security, Security::UseMask);
        assert_eq!(entry.allow_mask, Some(1));
    }

    #[test]
    fn plus_in_entry_body_is_a_space() {
        let fragment = record(&[("itemid", "2"), ("event", "Tea+and+biscuits%0Atoday+1%2B1")]);
        let entry = JournalEntry::from_fragment("frank", &fragment).unwrap();
        assert_eq!(entry.body, "Tea and biscuits\ntoday 1+1");

        let summary = EntrySummary::from_fragment("frank", &fragment, 9).unwrap();
        assert_eq!(summary.summary, "Tea and b");
    }

    #[test]
    fn entry_without_itemid_is_a_parse_error() {
        let fragment = record(&[("subject", "Hi")]);
        let err = JournalEntry::from_fragment("frank", &fragment).unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }), "{err:?}");
    }

    #[test]
    fn props_are_joined_by_item() {
        let reply = lines(&[
            ("success", "OK"),
            ("events_count", "2"),
            ("events_1_itemid", "10"),
            ("events_2_itemid", "11"),
            ("prop_count", "2"),
            ("prop_1_itemid", "11"),
            ("prop_1_name", "current_mood"),
            ("prop_1_value", "sleepy"),
            ("prop_2_itemid", "11"),
            ("prop_2_name", "taglist"),
            ("prop_2_value", "tea, cake"),
        ]);
        let entries = entries_from_reply("frank", &reply).unwrap();

        assert!(entries[0].metadata.is_empty());
        assert_eq!(entries[1].metadata["current_mood"], "sleepy");
        assert_eq!(entries[1].tags(), vec!["tea", "cake"]);
    }

    #[test]
    fn summary_is_cut_by_characters() {
        let fragment = record(&[("itemid", "5"), ("event", "h%C3%A9llo world")]);
        let summary = EntrySummary::from_fragment("frank", &fragment, 4).unwrap();
        assert_eq!(summary.summary, "héll");
    }

    #[test]
    fn tags_from_gettags_reply() {
        let reply = lines(&[
            ("success", "OK"),
            ("tag_count", "2"),
            ("tag_1_name", "tea"),
            ("tag_1_uses", "12"),
            ("tag_1_display", "1"),
            ("tag_2_name", "private stuff"),
            ("tag_2_display", "0"),
            ("tag_2_security", "private"),
        ]);
        let tags = tags_from_reply("frank", &reply).unwrap();

        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].uses, Some(12));
        assert!(tags[0].display);
        assert!(!tags[1].display);
        assert_eq!(tags[1].security.as_deref(), Some("private"));
    }

    #[test]
    fn day_counts_skip_non_day_keys() {
        let reply = lines(&[("success", "OK"), ("2003-01-02", "3"), ("2003-01-05", "1")]);
        let counts = day_counts_from_reply(&reply).unwrap();

        assert_eq!(counts.len(), 2);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn day_count_must_be_a_number() {
        let reply = lines(&[("success", "OK"), ("2003-01-02", "many")]);
        assert!(matches!(
            day_counts_from_reply(&reply),
            Err(CoreError::Parse { .. })
        ));
    }
}
