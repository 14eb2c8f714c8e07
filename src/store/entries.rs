use std::collections::HashMap;

use sqlx::QueryBuilder;

use super::locks::ChannelGuard;
use super::schema::Store;
use super::types::{CandidateEntry, SeenEntry, StoreError};

/// Batch size for entry upserts; SQLite's bind-parameter limit comfortably
/// covers 4 binds per row at this size.
const BATCH_SIZE: usize = 100;

// ============================================================================
// Pure novelty filter
// ============================================================================

/// Which candidates are novel for a channel, given its seen map.
///
/// A candidate is novel when its `entry_id` has never been recorded for the
/// channel, or when the recorded `updated` value differs (an edited item is
/// re-announced). Candidate order is preserved.
pub(crate) fn novel_candidates(
    seen: &HashMap<i64, String>,
    candidates: &[CandidateEntry],
) -> Vec<CandidateEntry> {
    candidates
        .iter()
        .filter(|candidate| {
            seen.get(&candidate.entry_id)
                .map_or(true, |updated| *updated != candidate.updated)
        })
        .cloned()
        .collect()
}

/// Load the seen map (entry_id → updated) for one channel.
///
/// Generic over the executor so the same query serves both the standalone
/// read path and the claim transaction.
async fn seen_map<'e, E>(executor: E, channel_id: i64) -> Result<HashMap<i64, String>, StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT entry_id, updated FROM entries WHERE channel_id = ?")
            .bind(channel_id)
            .fetch_all(executor)
            .await
            .map_err(StoreError::from_sqlx)?;
    Ok(rows.into_iter().collect())
}

/// Upsert entries in chunks: insert if `(entry_id, channel_id)` is absent,
/// otherwise refresh `updated` (and `feed_name`) in place.
async fn upsert_entries(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    channel_id: i64,
    feed_name: &str,
    entries: &[CandidateEntry],
) -> Result<(), StoreError> {
    for chunk in entries.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("INSERT INTO entries (feed_name, channel_id, entry_id, updated) ");

        builder.push_values(chunk, |mut b, entry| {
            b.push_bind(feed_name)
                .push_bind(channel_id)
                .push_bind(entry.entry_id)
                .push_bind(&entry.updated);
        });

        builder.push(
            " ON CONFLICT(entry_id, channel_id) DO UPDATE SET \
             updated = excluded.updated, feed_name = excluded.feed_name",
        );

        builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(StoreError::from_sqlx)?;
    }
    Ok(())
}

impl Store {
    // ========================================================================
    // Seen-Entry Operations
    // ========================================================================

    /// Return the subset of `candidates` not yet seen for this channel.
    ///
    /// Pure read; nothing is recorded. A caller composing this with
    /// [`Store::record_seen`] must hold the channel guard from
    /// [`Store::lock_channel`] across both calls, or use
    /// [`Store::claim_new_entries`] which does exactly that.
    pub async fn filter_new_entries(
        &self,
        channel_id: i64,
        feed_name: &str,
        candidates: &[CandidateEntry],
    ) -> Result<Vec<CandidateEntry>, StoreError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        self.with_timeout("filter_new_entries", async {
            let seen = seen_map(&self.pool, channel_id).await?;
            let novel = novel_candidates(&seen, candidates);
            tracing::debug!(
                channel_id,
                feed_name,
                candidates = candidates.len(),
                novel = novel.len(),
                "filtered candidate entries"
            );
            Ok(novel)
        })
        .await
    }

    /// Record entries as delivered to a channel. Durable on return.
    ///
    /// Idempotent: replaying the same input leaves the store unchanged.
    pub async fn record_seen(
        &self,
        channel_id: i64,
        feed_name: &str,
        entries: &[CandidateEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.with_timeout("record_seen", async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
            upsert_entries(&mut tx, channel_id, feed_name, entries).await?;
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            tracing::debug!(channel_id, feed_name, count = entries.len(), "recorded seen entries");
            Ok(())
        })
        .await
    }

    /// Filter and record in one atomic step, returning the novel subset.
    ///
    /// Takes the channel writer lock, then runs the seen-set read and the
    /// upsert inside a single transaction; concurrent poll cycles for the
    /// same channel can never both claim an entry. Entries are durable
    /// before this returns, so a crash after claiming drops the
    /// announcement rather than repeating it (at-most-once delivery).
    pub async fn claim_new_entries(
        &self,
        channel_id: i64,
        feed_name: &str,
        candidates: &[CandidateEntry],
    ) -> Result<Vec<CandidateEntry>, StoreError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        self.with_timeout("claim_new_entries", async {
            let _guard = self.locks.acquire(channel_id).await;

            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
            let seen = seen_map(&mut *tx, channel_id).await?;
            let novel = novel_candidates(&seen, candidates);
            if !novel.is_empty() {
                upsert_entries(&mut tx, channel_id, feed_name, &novel).await?;
            }
            tx.commit().await.map_err(StoreError::from_sqlx)?;

            tracing::debug!(
                channel_id,
                feed_name,
                candidates = candidates.len(),
                novel = novel.len(),
                "claimed new entries"
            );
            Ok(novel)
        })
        .await
    }

    /// Exclusive write access to one channel's filter-then-record sequence.
    ///
    /// For callers that want at-least-once delivery: filter, post, then
    /// record, all while holding this guard.
    pub async fn lock_channel(&self, channel_id: i64) -> ChannelGuard {
        self.locks.acquire(channel_id).await
    }

    /// Everything recorded as seen for a channel, ordered by entry id.
    pub async fn seen_entries(&self, channel_id: i64) -> Result<Vec<SeenEntry>, StoreError> {
        self.with_timeout("seen_entries", async {
            sqlx::query_as::<_, SeenEntry>(
                "SELECT feed_name, channel_id, entry_id, updated FROM entries
                 WHERE channel_id = ? ORDER BY entry_id",
            )
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }

    /// Number of seen entries recorded for a channel.
    pub async fn entry_count(&self, channel_id: i64) -> Result<u64, StoreError> {
        self.with_timeout("entry_count", async {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM entries WHERE channel_id = ?")
                    .bind(channel_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(StoreError::from_sqlx)?;
            Ok(count as u64)
        })
        .await
    }

    /// Delete entries whose channel no longer has a subscription.
    ///
    /// Unsubscribe already cascades; this sweep exists for databases written
    /// before the cascade, where entry rows accumulated indefinitely.
    /// Returns the number of rows removed.
    pub async fn prune_orphan_entries(&self) -> Result<u64, StoreError> {
        self.with_timeout("prune_orphan_entries", async {
            let result = sqlx::query(
                "DELETE FROM entries WHERE channel_id NOT IN (SELECT channel_id FROM feeds)",
            )
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

            let removed = result.rows_affected();
            if removed > 0 {
                tracing::info!(removed, "pruned orphaned entries");
            }
            Ok(removed)
        })
        .await
    }
}
