//! Appending messages to channels.

use crate::error::NagareResult;
use crate::serializer::{Serializer, DATA_FIELD};
use crate::stream_client::{Envelope, StreamClient};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Encodes values and appends them to channel streams.
pub struct Producer<C> {
    client: C,
    serializer: Serializer,
    trim: BTreeMap<String, usize>,
}

impl<C: StreamClient> Producer<C> {
    /// `trim` maps channel to its retained length cap (0 is unbounded).
    pub fn new(client: C, serializer: Serializer, trim: BTreeMap<String, usize>) -> Self {
        Self {
            client,
            serializer,
            trim,
        }
    }

    /// Configured cap for `channel`, 0 when none is configured.
    pub fn trim_for(&self, channel: &str) -> usize {
        self.trim.get(channel).copied().unwrap_or(0)
    }

    /// Encode `value` and append it to `channel` as `{data: <payload>}`.
    ///
    /// `trim` overrides the configured cap for this append. Returns the id
    /// assigned by the store.
    pub async fn stream<T>(
        &mut self,
        channel: &str,
        value: &T,
        trim: Option<usize>,
    ) -> NagareResult<String>
    where
        T: Serialize + ?Sized + Sync,
    {
        let max_len = trim.unwrap_or_else(|| self.trim_for(channel));
        let payload = self.serializer.encode(value)?;
        let envelope = Envelope::from_fields([(DATA_FIELD, payload)]);

        let id = self.client.append(channel, &envelope, max_len).await?;
        debug!(channel = %channel, message_id = %id, max_len, "Message streamed");

        Ok(id)
    }
}
