//! Store configuration, optionally loaded from a TOML file.
//!
//! The config file is optional — a missing file yields `StoreConfig::default()`.
//! Unknown keys are silently ignored by serde, though we log a warning when
//! the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for the store.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file. `":memory:"` opens a throwaway
    /// in-memory store.
    pub db_path: String,

    /// Connection pool size. SQLite is single-writer; a handful of
    /// connections covers concurrent readers under WAL.
    pub max_connections: u32,

    /// How long SQLite waits for a lock to release before reporting busy.
    pub busy_timeout_ms: u64,

    /// Upper bound on any single store operation, pool acquisition included.
    /// Expiry surfaces as a retryable `StoreError::Unavailable`.
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "feedledger.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            op_timeout_ms: 10_000,
        }
    }
}

impl StoreConfig {
    /// Defaults pointed at an in-memory database.
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(StoreConfig::default())`
    /// - Empty file → `Ok(StoreConfig::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to flag probable typos.
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "db_path",
                "max_connections",
                "busy_timeout_ms",
                "op_timeout_ms",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "unknown key in config file, ignoring");
                }
            }
        }

        let config: StoreConfig = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), db_path = %config.db_path, "loaded configuration");
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
