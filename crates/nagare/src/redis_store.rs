//! Redis implementation of the store contracts.
//!
//! Streams are read with `XREAD [BLOCK ms] STREAMS k1 k2 .. id1 id2 ..` and
//! written with `XADD key [MAXLEN n] * data <payload>`. Checkpoints are
//! plain `GET`/`SET` keys. Every physical key carries the connection's
//! `key_prefix`, the same way a prefixing client library would add it.

use crate::config::ConnectionConfig;
use crate::error::{NagareError, NagareResult};
use crate::stream_client::{Envelope, KeyValueStore, StreamBatch, StreamClient, StreamEntry};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Redis Streams + key-value store.
///
/// Cheap to clone; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisStore {
    /// Connect to the configured Redis.
    pub async fn connect(config: &ConnectionConfig) -> NagareResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!(key_prefix = %config.key_prefix, "Connected to Redis");

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn physical(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

/// Block argument for XREAD. Absent or zero means wait forever (`BLOCK 0`).
fn block_millis(block: Option<Duration>) -> usize {
    match block {
        Some(d) if !d.is_zero() => d.as_millis().clamp(1, usize::MAX as u128) as usize,
        _ => 0,
    }
}

fn value_bytes(value: &redis::Value) -> Option<Vec<u8>> {
    match value {
        redis::Value::BulkString(bytes) => Some(bytes.clone()),
        redis::Value::SimpleString(s) => Some(s.as_bytes().to_vec()),
        redis::Value::Int(i) => Some(i.to_string().into_bytes()),
        _ => None,
    }
}

fn into_batches(reply: StreamReadReply) -> NagareResult<Vec<StreamBatch>> {
    reply
        .keys
        .into_iter()
        .map(|key| {
            let entries = key
                .ids
                .into_iter()
                .map(|stream_id| {
                    let mut fields = Vec::with_capacity(stream_id.map.len());
                    for (name, value) in &stream_id.map {
                        let bytes = value_bytes(value).ok_or_else(|| {
                            NagareError::Protocol(format!(
                                "Unexpected value type for field '{}' of entry {}: {:?}",
                                name, stream_id.id, value
                            ))
                        })?;
                        fields.push((name.clone(), bytes));
                    }
                    Ok(StreamEntry {
                        id: stream_id.id,
                        envelope: Envelope::from_fields(fields),
                    })
                })
                .collect::<NagareResult<Vec<_>>>()?;

            Ok(StreamBatch {
                stream: key.key,
                entries,
            })
        })
        .collect()
}

#[async_trait]
impl StreamClient for RedisStore {
    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    async fn read(
        &mut self,
        cursors: &BTreeMap<String, String>,
        block: Option<Duration>,
    ) -> NagareResult<Vec<StreamBatch>> {
        if cursors.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = cursors.keys().map(|k| self.physical(k)).collect();
        let ids: Vec<&str> = cursors.values().map(String::as_str).collect();
        let options = StreamReadOptions::default().block(block_millis(block));

        // Nil on block timeout
        let reply: Option<StreamReadReply> =
            self.conn
                .xread_options(keys.as_slice(), ids.as_slice(), &options)
                .await?;

        match reply {
            Some(reply) => {
                let batches = into_batches(reply)?;
                debug!(
                    streams = batches.len(),
                    entries = batches.iter().map(|b| b.entries.len()).sum::<usize>(),
                    "Read from streams"
                );
                Ok(batches)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn append(
        &mut self,
        stream: &str,
        envelope: &Envelope,
        max_len: usize,
    ) -> NagareResult<String> {
        let key = self.physical(stream);
        let items: Vec<(String, Vec<u8>)> = envelope
            .fields()
            .map(|(name, value)| (name.to_string(), value.to_vec()))
            .collect();

        let id: String = if max_len > 0 {
            self.conn
                .xadd_maxlen(&key, StreamMaxlen::Equals(max_len), "*", items.as_slice())
                .await?
        } else {
            self.conn.xadd(&key, "*", items.as_slice()).await?
        };

        debug!(stream = %key, message_id = %id, max_len, "Appended to stream");
        Ok(id)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&mut self, key: &str) -> NagareResult<Option<String>> {
        let key = self.physical(key);
        let value: Option<String> = self.conn.get(&key).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &str) -> NagareResult<()> {
        let key = self.physical(key);
        let _: () = self.conn.set(&key, value).await?;
        Ok(())
    }
}
