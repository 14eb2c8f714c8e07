use super::schema::Store;
use super::types::{is_unique_violation, Feed, StoreError};
use crate::util::validate_feed_url;

impl Store {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe a channel to a feed.
    ///
    /// A channel maps to at most one feed; subscribing a channel that
    /// already has one fails with [`StoreError::DuplicateSubscription`]
    /// rather than replacing the existing row.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidUrl`] if `url` is not parseable http/https
    /// - [`StoreError::DuplicateSubscription`] if the channel is taken
    /// - [`StoreError::Unavailable`] on storage failure or timeout
    pub async fn subscribe(
        &self,
        channel_id: i64,
        guild_id: i64,
        name: &str,
        url: &str,
    ) -> Result<Feed, StoreError> {
        validate_feed_url(url)?;

        self.with_timeout("subscribe", async {
            let result =
                sqlx::query("INSERT INTO feeds (name, channel_id, guild_id, url) VALUES (?, ?, ?, ?)")
                    .bind(name)
                    .bind(channel_id)
                    .bind(guild_id)
                    .bind(url)
                    .execute(&self.pool)
                    .await;

            match result {
                Ok(_) => {
                    tracing::info!(channel_id, guild_id, name, "subscribed channel to feed");
                    Ok(Feed {
                        name: name.to_string(),
                        channel_id,
                        guild_id,
                        url: url.to_string(),
                    })
                }
                // The UNIQUE constraint on channel_id is the expected way to
                // lose a subscribe race, not a locking bug.
                Err(e) if is_unique_violation(&e) => {
                    Err(StoreError::DuplicateSubscription(channel_id))
                }
                Err(e) => Err(StoreError::from_sqlx(e)),
            }
        })
        .await
    }

    /// Remove a channel's subscription and every entry recorded for it.
    ///
    /// The schema declares no foreign key, so the cascade is enforced here:
    /// one transaction deletes the channel's entries, then its feed row.
    /// Unsubscribing a channel with no subscription is a no-op.
    pub async fn unsubscribe(&self, channel_id: i64) -> Result<(), StoreError> {
        self.with_timeout("unsubscribe", async {
            let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

            let entries = sqlx::query("DELETE FROM entries WHERE channel_id = ?")
                .bind(channel_id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;

            let feeds = sqlx::query("DELETE FROM feeds WHERE channel_id = ?")
                .bind(channel_id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;

            tx.commit().await.map_err(StoreError::from_sqlx)?;

            if feeds.rows_affected() > 0 {
                tracing::info!(
                    channel_id,
                    entries_removed = entries.rows_affected(),
                    "unsubscribed channel"
                );
            }
            Ok(())
        })
        .await
    }

    /// Look up the feed a channel is subscribed to, if any.
    pub async fn get_feed(&self, channel_id: i64) -> Result<Option<Feed>, StoreError> {
        self.with_timeout("get_feed", async {
            sqlx::query_as::<_, Feed>(
                "SELECT name, channel_id, guild_id, url FROM feeds WHERE channel_id = ?",
            )
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }

    /// All subscriptions in one guild, ordered by channel for determinism.
    pub async fn list_feeds(&self, guild_id: i64) -> Result<Vec<Feed>, StoreError> {
        self.with_timeout("list_feeds", async {
            sqlx::query_as::<_, Feed>(
                "SELECT name, channel_id, guild_id, url FROM feeds
                 WHERE guild_id = ? ORDER BY channel_id",
            )
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }

    /// Every subscription across all guilds; the poll loop walks this.
    pub async fn list_all_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        self.with_timeout("list_all_feeds", async {
            sqlx::query_as::<_, Feed>(
                "SELECT name, channel_id, guild_id, url FROM feeds ORDER BY channel_id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{Store, StoreError};

    async fn test_store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_roundtrip() {
        let store = test_store().await;

        let feed = store
            .subscribe(100, 1, "releases", "https://example.com/releases.atom")
            .await
            .unwrap();
        assert_eq!(feed.channel_id, 100);

        let found = store.get_feed(100).await.unwrap().unwrap();
        assert_eq!(found.name, "releases");
        assert_eq!(found.guild_id, 1);
        assert_eq!(found.url, "https://example.com/releases.atom");
    }

    #[tokio::test]
    async fn test_subscribe_duplicate_channel_rejected() {
        let store = test_store().await;
        store
            .subscribe(100, 1, "releases", "https://example.com/a.xml")
            .await
            .unwrap();

        let err = store
            .subscribe(100, 1, "other", "https://example.com/b.xml")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSubscription(100)));
        assert!(!err.is_retryable());

        // The original subscription is untouched.
        let feed = store.get_feed(100).await.unwrap().unwrap();
        assert_eq!(feed.name, "releases");
    }

    #[tokio::test]
    async fn test_subscribe_same_name_different_channels() {
        let store = test_store().await;

        // Feed names need not be unique across channels.
        store
            .subscribe(100, 1, "news", "https://a.example.com/rss")
            .await
            .unwrap();
        store
            .subscribe(101, 1, "news", "https://b.example.com/rss")
            .await
            .unwrap();

        assert_eq!(store.list_feeds(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_url() {
        let store = test_store().await;

        let err = store
            .subscribe(100, 1, "nope", "ftp://example.com/feed")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl(_)));

        let err = store.subscribe(100, 1, "nope", "not a url").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl(_)));

        // Nothing was inserted.
        assert!(store.get_feed(100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_feed_missing_is_none() {
        let store = test_store().await;
        assert!(store.get_feed(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_feeds_scoped_to_guild_and_sorted() {
        let store = test_store().await;
        store
            .subscribe(300, 1, "c", "https://example.com/c.xml")
            .await
            .unwrap();
        store
            .subscribe(100, 1, "a", "https://example.com/a.xml")
            .await
            .unwrap();
        store
            .subscribe(200, 2, "b", "https://example.com/b.xml")
            .await
            .unwrap();

        let guild1 = store.list_feeds(1).await.unwrap();
        let channels: Vec<i64> = guild1.iter().map(|f| f.channel_id).collect();
        assert_eq!(channels, vec![100, 300]);

        let guild2 = store.list_feeds(2).await.unwrap();
        assert_eq!(guild2.len(), 1);
        assert_eq!(guild2[0].channel_id, 200);

        let all = store.list_all_feeds().await.unwrap();
        let channels: Vec<i64> = all.iter().map(|f| f.channel_id).collect();
        assert_eq!(channels, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_feed() {
        let store = test_store().await;
        store
            .subscribe(100, 1, "news", "https://example.com/rss")
            .await
            .unwrap();

        store.unsubscribe(100).await.unwrap();

        assert!(store.get_feed(100).await.unwrap().is_none());
        assert!(store.list_feeds(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_channel_is_noop() {
        let store = test_store().await;
        store.unsubscribe(9999).await.unwrap();
    }

    #[tokio::test]
    async fn test_resubscribe_after_unsubscribe() {
        let store = test_store().await;
        store
            .subscribe(100, 1, "old", "https://example.com/old.xml")
            .await
            .unwrap();
        store.unsubscribe(100).await.unwrap();

        store
            .subscribe(100, 1, "new", "https://example.com/new.xml")
            .await
            .unwrap();
        let feed = store.get_feed(100).await.unwrap().unwrap();
        assert_eq!(feed.name, "new");
    }
}
