use thiserror::Error;

use crate::util::UrlCheckError;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors, split along the recoverable/fatal line the callers need.
///
/// `DuplicateSubscription` and `InvalidUrl` are expected, recoverable
/// outcomes of user commands. `Unavailable` covers I/O failures and
/// timeouts and is safe to retry from the fetch scheduler.
/// `ConstraintViolation` means a uniqueness violation surfaced outside the
/// channel writer lock, which indicates a locking-discipline bug upstream.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The channel already has a feed subscription.
    #[error("channel {0} already has a feed subscription")]
    DuplicateSubscription(i64),

    /// The feed URL was rejected at subscribe time.
    #[error("invalid feed url: {0}")]
    InvalidUrl(#[from] UrlCheckError),

    /// Underlying storage I/O failure or timeout. Retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Uniqueness violation from concurrent unsynchronized writers.
    #[error("uniqueness violation outside the channel writer lock: {0}")]
    ConstraintViolation(String),
}

impl StoreError {
    /// Classify a sqlx error.
    ///
    /// Unique-constraint violations are never expected here once the caller
    /// holds the channel writer lock, so they are logged loudly rather than
    /// folded into the retryable bucket.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                tracing::error!(
                    error = %db_err,
                    "unique constraint violated outside the writer lock; \
                     investigate caller locking discipline"
                );
                return StoreError::ConstraintViolation(db_err.message().to_string());
            }
        }
        StoreError::Unavailable(err.to_string())
    }

    /// Whether the caller's retry policy (external to this crate) applies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// True when the error is a unique-constraint violation.
///
/// `subscribe` uses this to turn the `feeds.channel_id UNIQUE` violation
/// into the expected [`StoreError::DuplicateSubscription`] outcome instead
/// of the fatal classification `from_sqlx` applies.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

// ============================================================================
// Data Structures
// ============================================================================

/// A feed subscription bound to exactly one destination channel.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub name: String,
    pub channel_id: i64,
    pub guild_id: i64,
    pub url: String,
}

/// One `(entry_id, updated)` pair as supplied by the external fetcher.
///
/// `updated` is the feed-provided last-modified string, kept opaque: the
/// store only ever compares it for equality, so re-published or edited
/// items show up as novel again without any timestamp parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub entry_id: i64,
    pub updated: String,
}

/// An entry already delivered to a channel, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SeenEntry {
    pub feed_name: String,
    pub channel_id: i64,
    pub entry_id: i64,
    pub updated: String,
}
