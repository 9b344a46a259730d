// ── Item-keyed cache ──
//
// Concurrent storage for values fetched from the server, keyed by the
// item id they were fetched under. Values are shared as `Arc` so readers
// never hold a shard lock while using them.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::ItemId;

/// A concurrent cache of server values keyed by `ItemId`.
///
/// Item ids are never reused within a journal, so an entry stays valid
/// until the cache is cleared.
pub(crate) struct ItemCache<T> {
    by_id: DashMap<ItemId, Arc<T>>,
}

impl<T> ItemCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            by_id: DashMap::new(),
        }
    }

    /// Store `value` under `id`, replacing any previous value.
    pub(crate) fn insert(&self, id: ItemId, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.by_id.insert(id, Arc::clone(&value));
        value
    }

    pub(crate) fn get(&self, id: ItemId) -> Option<Arc<T>> {
        self.by_id.get(&id).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn clear(&self) {
        self.by_id.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    /// All cached values, ordered by item id.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        let mut values: Vec<(ItemId, Arc<T>)> = self
            .by_id
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        values.sort_by_key(|(id, _)| *id);
        values.into_iter().map(|(_, v)| v).collect()
    }
}
