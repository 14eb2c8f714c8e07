//! Durable feed subscription registry and seen-entry store.
//!
//! The core a feed-announcing chat bot is built around: a mapping from
//! `(channel, feed)` to feed metadata and a per-channel set of entry ids
//! already delivered, used to decide which freshly fetched items are novel
//! and must be announced. Fetching, feed parsing, posting and scheduling
//! all live outside this crate and call into [`Store`].
//!
//! A poll cycle looks like:
//!
//! ```no_run
//! # async fn poll(store: feedledger::Store) -> Result<(), feedledger::StoreError> {
//! use feedledger::CandidateEntry;
//!
//! for feed in store.list_all_feeds().await? {
//!     // fetched elsewhere: the feed's current (entry_id, updated) pairs
//!     let candidates: Vec<CandidateEntry> = Vec::new();
//!     let novel = store
//!         .claim_new_entries(feed.channel_id, &feed.name, &candidates)
//!         .await?;
//!     for entry in novel {
//!         // post entry to feed.channel_id
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! `claim_new_entries` records entries as seen before the caller posts, so a
//! crash between the two drops an announcement instead of repeating it
//! (at-most-once). Callers preferring at-least-once compose
//! [`Store::filter_new_entries`] and [`Store::record_seen`] themselves under
//! [`Store::lock_channel`].

pub mod config;
pub mod store;
pub mod util;

pub use config::{ConfigError, StoreConfig};
pub use store::{CandidateEntry, ChannelGuard, Feed, SeenEntry, Store, StoreError};
