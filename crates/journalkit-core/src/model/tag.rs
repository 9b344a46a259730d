// ── Tags ──
//
// `Tag` is the server's description of one tag; `TagSet` is the ordered,
// duplicate-free collection of tag names a journal knows about.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A tag as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub journal: String,
    pub name: String,
    /// Number of entries carrying the tag, when reported.
    pub uses: Option<u32>,
    /// Whether the tag shows in the journal's public tag list.
    pub display: bool,
    pub security: Option<String>,
}

/// Ordered tag names. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(IndexSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tag` unless it is already present. Returns `true` if added.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut tags = TagSet::new();
        assert!(tags.insert("tea"));
        assert!(!tags.insert("tea"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let mut tags = TagSet::new();
        tags.insert("Tea");
        assert!(tags.insert("tea"));
        assert!(!tags.contains("TEA"));
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["Tea", "tea"]);
    }

    #[test]
    fn collecting_drops_duplicates_in_order() {
        let tags: TagSet = ["b", "a", "b"].into_iter().collect();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
