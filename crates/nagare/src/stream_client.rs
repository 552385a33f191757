//! Contracts nagare needs from the external log store.
//!
//! The listener and producer only talk to the store through these traits, so
//! the Redis implementation in [`crate::redis_store`] can be swapped for an
//! in-memory double in tests.

use crate::error::NagareResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Field map of a single stream entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    fields: BTreeMap<String, Vec<u8>>,
}

impl Envelope {
    /// Build an envelope from `(field, value)` pairs.
    pub fn from_fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Vec<u8>)>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Raw bytes of a field.
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// Iterate over all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// A message read from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Store-assigned id (e.g. "1700000000000-0").
    pub id: String,
    pub envelope: Envelope,
}

/// Entries returned by one read for one stream, in store order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBatch {
    /// Physical stream name as reported by the store.
    pub stream: String,
    pub entries: Vec<StreamEntry>,
}

/// Append and blocking multi-read over named streams.
#[async_trait]
pub trait StreamClient: Send {
    /// Prefix the store silently adds to every physical name.
    fn key_prefix(&self) -> &str;

    /// Read entries strictly after each cursor, across all given streams.
    ///
    /// `cursors` maps logical stream name to the last seen id. With a
    /// `block` duration the call waits up to that long for new data; with
    /// `None` it waits indefinitely. An empty result means nothing arrived.
    async fn read(
        &mut self,
        cursors: &BTreeMap<String, String>,
        block: Option<Duration>,
    ) -> NagareResult<Vec<StreamBatch>>;

    /// Append an entry with a store-generated id, trimming the stream to
    /// `max_len` entries when it is non-zero. Returns the new id.
    async fn append(
        &mut self,
        stream: &str,
        envelope: &Envelope,
        max_len: usize,
    ) -> NagareResult<String>;
}

/// Plain string get/set used for checkpoints.
#[async_trait]
pub trait KeyValueStore: Send {
    async fn get(&mut self, key: &str) -> NagareResult<Option<String>>;

    async fn set(&mut self, key: &str, value: &str) -> NagareResult<()>;
}
