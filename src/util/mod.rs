//! Utility functions shared across the store.
//!
//! # Examples
//!
//! ```
//! use feedledger::util::validate_feed_url;
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//! ```

mod url_check;

pub use url_check::{validate_feed_url, UrlCheckError};
