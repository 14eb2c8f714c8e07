use std::future::Future;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::locks::ChannelLocks;
use super::types::StoreError;
use crate::config::StoreConfig;

// ============================================================================
// Store
// ============================================================================

/// Handle to the feed registry and seen-entry store.
///
/// Cheap to clone (pool-backed); open one per process at startup and pass it
/// into whatever polls feeds and handles commands. Tests open an isolated
/// in-memory instance each.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) locks: ChannelLocks,
    pub(crate) op_timeout: Duration,
}

impl Store {
    /// Open the database and create the schema if it is missing.
    ///
    /// The journal mode is set to write-ahead log once here, so readers
    /// (`get_feed`, `list_feeds`) proceed while a poll cycle writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be opened
    /// or the schema cannot be created.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let op_timeout = Duration::from_millis(config.op_timeout_ms);

        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        // A pooled `:memory:` database is per-connection; clamping to one
        // connection keeps every operation on the same database.
        let max_connections = if config.db_path == ":memory:" {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(op_timeout)
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let store = Self {
            pool,
            locks: ChannelLocks::new(),
            op_timeout,
        };
        store.migrate().await?;

        tracing::info!(
            path = %config.db_path,
            max_connections,
            "opened feed store"
        );
        Ok(store)
    }

    /// Open an isolated in-memory store. Intended for tests and embedders
    /// that want a throwaway instance.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::in_memory()).await
    }

    /// Create tables and indexes.
    ///
    /// All DDL runs in one transaction and uses `IF NOT EXISTS`, so opening
    /// an existing database is a no-op and a failure mid-way leaves the
    /// previous schema intact.
    async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                name TEXT NOT NULL,
                channel_id INTEGER NOT NULL UNIQUE,
                guild_id INTEGER NOT NULL,
                url TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                feed_name TEXT NOT NULL,
                channel_id INTEGER NOT NULL,
                entry_id INTEGER NOT NULL,
                updated TEXT NOT NULL,
                PRIMARY KEY (entry_id, channel_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        // The primary key leads with entry_id, so the per-channel seen-set
        // scan needs its own index.
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_channel ON entries(channel_id)")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feeds_guild ON feeds(guild_id)")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)
    }

    /// Bound an operation by the configured timeout.
    ///
    /// Expiry surfaces as [`StoreError::Unavailable`]; the store never
    /// retries on its own, that policy belongs to the fetch scheduler.
    pub(crate) async fn with_timeout<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "store operation timed out"
                );
                Err(StoreError::Unavailable(format!(
                    "{op} timed out after {}ms",
                    self.op_timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.list_all_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let config = StoreConfig {
            db_path: path.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };

        {
            let store = Store::open(&config).await.unwrap();
            store
                .subscribe(1, 10, "news", "https://example.com/rss")
                .await
                .unwrap();
        }

        // Second open must not clobber existing rows.
        let store = Store::open(&config).await.unwrap();
        let feed = store.get_feed(1).await.unwrap().unwrap();
        assert_eq!(feed.name, "news");
    }

    #[tokio::test]
    async fn test_file_backed_store_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let config = StoreConfig {
            db_path: path.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        let store = Store::open(&config).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_unavailable() {
        let store = Store::open(&StoreConfig {
            op_timeout_ms: 20,
            ..StoreConfig::in_memory()
        })
        .await
        .unwrap();

        let result: Result<(), StoreError> = store
            .with_timeout("stalled_op", std::future::pending())
            .await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("stalled_op"));
    }
}
