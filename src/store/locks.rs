//! Per-channel writer serialization.
//!
//! The store requires at most one filter-then-record sequence in flight per
//! channel; two concurrent pollers racing on the same channel could both see
//! an entry as unseen and announce it twice. Locks live in a shared map keyed
//! by `channel_id` and are created on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub(crate) struct ChannelLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl ChannelLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to a channel.
    ///
    /// Lock entries are never removed; the registry is bounded by the number
    /// of distinct channels ever polled in this process.
    pub(crate) async fn acquire(&self, channel_id: i64) -> ChannelGuard {
        let lock = {
            // A poisoned registry only means another thread panicked while
            // holding the map guard; the map itself is still usable.
            let mut map = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(map.entry(channel_id).or_default())
        };
        ChannelGuard {
            _permit: lock.lock_owned().await,
        }
    }
}

/// Exclusive write access to one channel.
///
/// Held for the duration of a filter-then-record sequence; dropping the
/// guard releases the channel to the next writer.
pub struct ChannelGuard {
    _permit: OwnedMutexGuard<()>,
}
