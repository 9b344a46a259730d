//! Flat key/value codec.
//!
//! The flat protocol has no native arrays. A list stored under `key` is
//! written as a count key followed by 1-based indexed element keys:
//!
//! ```text
//! events_count = 2
//! events_1_itemid = 17      # record element: key_<i>_<field>
//! events_1_subject = Hi
//! events_2_itemid = 18
//! access_count = 1
//! access_1 = community      # scalar element: key_<i>
//! ```
//!
//! Records may hold further lists (`events_1_tags_count`, `events_1_tags_1`),
//! so the scheme nests to any depth as long as list elements are either
//! scalars or non-empty records. Requests travel form-urlencoded
//! ([`Framing::Form`]); the server answers with alternating key and value
//! lines ([`Framing::Lines`]).

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use bytes::Bytes;
use indexmap::IndexMap;
use tracing::{trace, warn};
use url::form_urlencoded;

use crate::error::Error;

const COUNT_SUFFIX: &str = "_count";

/// Ordered request parameters. Top-level keys are encoded in insertion order.
pub type Params = IndexMap<String, FlatValue>;

/// Fields of a record list element, encoded in key order.
pub type Record = BTreeMap<String, FlatValue>;

/// A decoded reply. Consumed into typed values, never cached.
pub type ReplyMap = BTreeMap<String, FlatValue>;

/// A value in a request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatValue {
    Scalar(String),
    List(Vec<FlatValue>),
    /// Only valid as a list element.
    Record(Record),
}

impl FlatValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FlatValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<&str> for FlatValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.to_owned())
    }
}

impl From<String> for FlatValue {
    fn from(s: String) -> Self {
        Self::Scalar(s)
    }
}

impl From<Vec<FlatValue>> for FlatValue {
    fn from(items: Vec<FlatValue>) -> Self {
        Self::List(items)
    }
}

impl From<Record> for FlatValue {
    fn from(fields: Record) -> Self {
        Self::Record(fields)
    }
}

macro_rules! scalar_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FlatValue {
                fn from(v: $ty) -> Self {
                    Self::Scalar(v.to_string())
                }
            }
        )*
    };
}

scalar_from_display!(u8, u16, u32, u64, usize, i32, i64);

/// Build a [`Params`] set from `(key, value)` pairs, keeping their order.
pub fn params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Params
where
    K: Into<String>,
    V: Into<FlatValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Body framing on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `application/x-www-form-urlencoded`, used for requests.
    #[default]
    Form,
    /// `key\nvalue\n` pairs, used by the server for replies.
    Lines,
}

// ── Encoding ─────────────────────────────────────────────────────────

/// Serialize a parameter set into a wire body.
pub fn encode(params: &Params, framing: Framing) -> Result<Bytes, Error> {
    let pairs = flatten(params)?;
    match framing {
        Framing::Form => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &pairs {
                serializer.append_pair(key, value);
            }
            Ok(Bytes::from(serializer.finish()))
        }
        Framing::Lines => {
            let mut body = String::new();
            for (key, value) in &pairs {
                if value.contains('\n') {
                    return Err(Error::encoding(format!(
                        "value for '{key}' contains a line break"
                    )));
                }
                body.push_str(key);
                body.push('\n');
                body.push_str(value);
                body.push('\n');
            }
            Ok(Bytes::from(body))
        }
    }
}

/// Apply the compound-key convention, producing wire pairs in a stable order.
///
/// Rejects parameter sets that would not decode back to themselves.
pub fn flatten(params: &Params) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        check_segment(key)?;
        if matches!(value, FlatValue::Record(_)) {
            return Err(Error::encoding(format!(
                "record under '{key}' is only valid as a list element"
            )));
        }
        flatten_value(key, value, &mut pairs)?;
    }

    let mut seen = HashSet::with_capacity(pairs.len());
    if let Some((dup, _)) = pairs.iter().find(|(k, _)| !seen.insert(k.as_str())) {
        return Err(Error::encoding(format!("key '{dup}' is produced twice")));
    }

    let expected: ReplyMap = params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    match unflatten(pairs.clone()) {
        Ok(rebuilt) if rebuilt == expected => Ok(pairs),
        _ => Err(Error::encoding(
            "parameter keys collide under the compound-key convention",
        )),
    }
}

fn flatten_value(
    key: &str,
    value: &FlatValue,
    out: &mut Vec<(String, String)>,
) -> Result<(), Error> {
    match value {
        FlatValue::Scalar(v) => out.push((key.to_owned(), v.clone())),
        FlatValue::List(items) => {
            out.push((format!("{key}{COUNT_SUFFIX}"), items.len().to_string()));
            for (idx, item) in items.iter().enumerate() {
                let element = format!("{key}_{}", idx + 1);
                match item {
                    FlatValue::Scalar(v) => out.push((element, v.clone())),
                    FlatValue::Record(fields) => {
                        if fields.is_empty() {
                            return Err(Error::encoding(format!(
                                "element '{element}' is an empty record"
                            )));
                        }
                        for (field, nested) in fields {
                            check_segment(field)?;
                            if matches!(nested, FlatValue::Record(_)) {
                                return Err(Error::encoding(format!(
                                    "field '{element}_{field}' holds a record outside a list"
                                )));
                            }
                            flatten_value(&format!("{element}_{field}"), nested, out)?;
                        }
                    }
                    FlatValue::List(_) => {
                        return Err(Error::encoding(format!(
                            "element '{element}' is a list; wrap it in a record"
                        )));
                    }
                }
            }
        }
        FlatValue::Record(_) => {
            return Err(Error::encoding(format!(
                "record under '{key}' is only valid as a list element"
            )));
        }
    }
    Ok(())
}

fn check_segment(segment: &str) -> Result<(), Error> {
    if segment.is_empty() {
        return Err(Error::encoding("empty key"));
    }
    if segment.contains('\n') {
        return Err(Error::encoding(format!("key {segment:?} contains a line break")));
    }
    if segment == "count" || segment.ends_with(COUNT_SUFFIX) {
        return Err(Error::encoding(format!(
            "key '{segment}' is reserved for list counts"
        )));
    }
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Parse a wire body back into a structured reply.
pub fn decode(body: &[u8], framing: Framing) -> Result<ReplyMap, Error> {
    let pairs = match framing {
        Framing::Form => form_urlencoded::parse(body).into_owned().collect(),
        Framing::Lines => split_lines(body)?,
    };
    trace!(pairs = pairs.len(), ?framing, "decoding flat body");
    unflatten(pairs)
}

/// Invert the compound-key convention over raw wire pairs.
///
/// Later duplicates of a key replace earlier ones.
pub fn unflatten(pairs: impl IntoIterator<Item = (String, String)>) -> Result<ReplyMap, Error> {
    decode_level(pairs.into_iter().collect())
}

fn split_lines(body: &[u8]) -> Result<Vec<(String, String)>, Error> {
    let text = match std::str::from_utf8(body) {
        Ok(text) => Cow::Borrowed(text),
        Err(e) => {
            warn!(error = %e, "reply is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(body)
        }
    };

    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    if lines.len() % 2 != 0 {
        let dangling = lines.last().copied().unwrap_or_default();
        return Err(Error::parse(format!(
            "reply ends with key {dangling:?} but no value"
        )));
    }

    Ok(lines
        .chunks_exact(2)
        .filter_map(|pair| match pair {
            [key, value] => Some(((*key).to_owned(), (*value).to_owned())),
            _ => None,
        })
        .collect())
}

fn decode_level(mut flat: BTreeMap<String, String>) -> Result<ReplyMap, Error> {
    let mut out = ReplyMap::new();

    for prefix in list_prefixes(&flat) {
        let count_key = format!("{prefix}{COUNT_SUFFIX}");
        let Some(raw_count) = flat.remove(&count_key) else {
            continue;
        };
        let count: usize = raw_count.trim().parse().map_err(|_| {
            Error::parse(format!("'{count_key}' is not a count: {raw_count:?}"))
        })?;

        let element_prefix = format!("{prefix}_");
        let member_keys: Vec<String> = flat
            .range(element_prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&element_prefix))
            .filter(|(k, _)| {
                k[element_prefix.len()..].starts_with(|c: char| c.is_ascii_digit())
            })
            .map(|(k, _)| k.clone())
            .collect();

        let mut scalars: BTreeMap<usize, String> = BTreeMap::new();
        let mut records: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
        for key in member_keys {
            let Some(value) = flat.remove(&key) else {
                continue;
            };
            let rest = &key[element_prefix.len()..];
            let (index_text, field) = match rest.split_once('_') {
                Some((index, field)) => (index, Some(field)),
                None => (rest, None),
            };
            let index = parse_index(index_text)
                .filter(|i| (1..=count).contains(i))
                .ok_or_else(|| {
                    Error::parse(format!("'{key}' is outside list '{prefix}' of {count}"))
                })?;
            match field {
                None => {
                    scalars.insert(index, value);
                }
                Some(field) => {
                    records
                        .entry(index)
                        .or_default()
                        .insert(field.to_owned(), value);
                }
            }
        }

        let mut items = Vec::with_capacity(count);
        for index in 1..=count {
            match (scalars.remove(&index), records.remove(&index)) {
                (Some(value), None) => items.push(FlatValue::Scalar(value)),
                (None, Some(fields)) => items.push(FlatValue::Record(decode_level(fields)?)),
                (Some(_), Some(_)) => {
                    return Err(Error::parse(format!(
                        "element {prefix}_{index} is both a value and a record"
                    )));
                }
                (None, None) => {
                    return Err(Error::parse(format!(
                        "list '{prefix}' is missing element {index} of {count}"
                    )));
                }
            }
        }
        out.insert(prefix, FlatValue::List(items));
    }

    for (key, value) in flat {
        if out.contains_key(&key) {
            return Err(Error::parse(format!(
                "'{key}' is both a value and a list"
            )));
        }
        out.insert(key, FlatValue::Scalar(value));
    }
    Ok(out)
}

/// Prefixes that own a `_count` key at this level, outermost first.
///
/// A count key whose prefix sits inside an element of a shorter list
/// (`events_1_tags_count` under `events`) belongs to that element.
fn list_prefixes(flat: &BTreeMap<String, String>) -> Vec<String> {
    let mut candidates: Vec<&str> = flat
        .keys()
        .filter_map(|k| k.strip_suffix(COUNT_SUFFIX))
        .filter(|p| !p.is_empty())
        .collect();
    candidates.sort_by_key(|p| p.len());

    let mut accepted: Vec<String> = Vec::new();
    for candidate in candidates {
        let nested = accepted.iter().any(|outer| {
            candidate
                .strip_prefix(outer.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        });
        if !nested {
            accepted.push(candidate.to_owned());
        }
    }
    accepted
}

/// Canonical 1-based index: digits only, no leading zero.
fn parse_index(text: &str) -> Option<usize> {
    if text.is_empty() || text.starts_with('0') || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
