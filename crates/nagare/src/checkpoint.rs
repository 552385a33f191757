//! Durable per-channel cursors.

use crate::error::NagareResult;
use crate::stream_client::KeyValueStore;
use tracing::trace;

/// Cursor meaning "from the beginning of the stream".
pub const START_CURSOR: &str = "0";

/// Persists the id of the last processed message of every channel under
/// `<prefix><channel>`.
pub struct CheckpointStore<K> {
    store: K,
    prefix: String,
}

impl<K: KeyValueStore> CheckpointStore<K> {
    pub fn new(store: K, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Key under which the channel's cursor is stored.
    pub fn key(&self, channel: &str) -> String {
        format!("{}{}", self.prefix, channel)
    }

    /// Last persisted id for `channel`, or `default` when none exists.
    pub async fn get(&mut self, channel: &str, default: &str) -> NagareResult<String> {
        let key = self.key(channel);
        let value = self.store.get(&key).await?;
        Ok(value.unwrap_or_else(|| default.to_string()))
    }

    /// Persist `id` as the channel's cursor, overwriting the previous value.
    pub async fn set(&mut self, channel: &str, id: &str) -> NagareResult<()> {
        let key = self.key(channel);
        self.store.set(&key, id).await?;
        trace!(channel = %channel, message_id = %id, "Checkpoint written");
        Ok(())
    }
}
