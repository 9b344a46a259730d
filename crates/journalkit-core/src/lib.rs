//! Journal retrieval and local indexing on top of `journalkit-api`.
//!
//! - **[`Session`]** logs an account in (or resumes one restored from saved
//!   server state) and hands out a [`JournalIndex`] per readable journal.
//!
//! - **[`JournalIndex`]** queries one journal: single entries, the last N
//!   entries, a day's entries, their summaries, per-day counts and tags.
//!   Typed results are cached by [`ItemId`] in lock-free `DashMap` caches.
//!
//! - **Domain model** ([`model`]) holds the canonical types built from
//!   decoded replies by [`convert`].
//!
//! ```no_run
//! # async fn demo(config: journalkit_core::AccountConfig) -> Result<(), journalkit_core::CoreError> {
//! let session = journalkit_core::Session::connect(&config).await?;
//! let journal = session.default_journal();
//! for entry in journal.entries_last_n(5, None).await? {
//!     println!("{} {:?}", entry.item_id, entry.subject);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod journal;
pub mod model;
pub mod session;
mod store;

pub use config::{AccountConfig, DEFAULT_SUMMARY_LENGTH, JournalOptions, TlsVerification};
pub use error::CoreError;
pub use journal::JournalIndex;
pub use model::{DayCounts, EntrySummary, ItemId, JournalEntry, Security, Tag, TagSet};
pub use session::Session;

pub use journalkit_api::{Account, LoginReply};
