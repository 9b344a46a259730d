// ── Per-journal caches ──

mod cache;

pub(crate) use cache::ItemCache;
