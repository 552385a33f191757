//! Test harness for nagare.
//!
//! Provides:
//! - MockStore: in-memory streams + key-value store with an operation log
//! - RecordingHandler / FailingHandler / PanickingHandler
//! - RecordingSink: keeps every outcome record
//! - TestHarness: wires a Listener over a MockStore

use crate::checkpoint::CheckpointStore;
use crate::dispatcher::Dispatcher;
use crate::error::{NagareError, NagareResult};
use crate::handler::{Handler, HandlerRegistry, NamedHandler};
use crate::listener::{Listener, ListenerExit, ListenerOptions};
use crate::serializer::{MessageData, Serializer, DATA_FIELD};
use crate::sink::{FailureRecord, OutcomeSink, SuccessRecord};
use crate::stream_client::{Envelope, KeyValueStore, StreamBatch, StreamClient, StreamEntry};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Process-wide sequence used to order events across handlers and stores.
static SEQ: AtomicU64 = AtomicU64::new(1);

pub fn next_seq() -> u64 {
    SEQ.fetch_add(1, AtomicOrdering::SeqCst)
}

fn unavailable() -> NagareError {
    NagareError::StoreUnavailable(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

/// Parse "<ms>-<seq>" (or a bare "<ms>") into a comparable pair.
pub fn parse_id(id: &str) -> (u64, u64) {
    let mut parts = id.splitn(2, '-');
    let ms = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let seq = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (ms, seq)
}

/// An operation observed by the mock store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Read { cursors: BTreeMap<String, String> },
    Get { key: String },
    Set { key: String, value: String, seq: u64 },
    Append { stream: String, max_len: usize },
}

#[derive(Default)]
struct StoreInner {
    streams: HashMap<String, Vec<StreamEntry>>,
    kv: HashMap<String, String>,
    ops: Vec<StoreOp>,
    injected: VecDeque<Vec<StreamBatch>>,
    next_id: u64,
    unavailable: bool,
    sets_before_failure: Option<usize>,
    idle_shutdown: Option<broadcast::Sender<()>>,
}

/// In-memory stand-in for Redis.
///
/// Physical names carry `key_prefix`, like the real store. Reads return
/// entries strictly after each cursor. When a read finds nothing it either
/// fires the idle shutdown signal, sleeps for the block timeout, or blocks
/// forever.
#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<Mutex<StoreInner>>,
    key_prefix: String,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            inner: Arc::default(),
            key_prefix: prefix.to_string(),
        }
    }

    fn physical(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Insert an entry with an explicit id into a logical stream.
    pub fn add_entry(&self, stream: &str, id: &str, envelope: Envelope) {
        let physical = self.physical(stream);
        let mut inner = self.inner.lock().unwrap();
        inner.streams.entry(physical).or_default().push(StreamEntry {
            id: id.to_string(),
            envelope,
        });
    }

    /// Insert a JSON payload wrapped in a `data` envelope.
    pub fn add_json(&self, stream: &str, id: &str, value: serde_json::Value) {
        self.add_entry(stream, id, json_envelope(&value));
    }

    /// Return `batches` verbatim from the next read, ignoring cursors.
    pub fn inject(&self, batches: Vec<StreamBatch>) {
        self.inner.lock().unwrap().injected.push_back(batches);
    }

    /// Seed a raw key (logical name).
    pub fn put(&self, key: &str, value: &str) {
        let physical = self.physical(key);
        self.inner
            .lock()
            .unwrap()
            .kv
            .insert(physical, value.to_string());
    }

    /// Read a raw key (logical name).
    pub fn value(&self, key: &str) -> Option<String> {
        let physical = self.physical(key);
        self.inner.lock().unwrap().kv.get(&physical).cloned()
    }

    /// Entries of a logical stream.
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        let physical = self.physical(stream);
        self.inner
            .lock()
            .unwrap()
            .streams
            .get(&physical)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every operation fail as unavailable. Clearing it also drops a
    /// pending `fail_after_sets`.
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.unavailable = unavailable;
        if !unavailable {
            inner.sets_before_failure = None;
        }
    }

    /// Let `n` more `set` calls succeed, then fail as unavailable.
    pub fn fail_after_sets(&self, n: usize) {
        self.inner.lock().unwrap().sets_before_failure = Some(n);
    }

    /// Send on `tx` the first time a read finds no data.
    pub fn shutdown_when_idle(&self, tx: broadcast::Sender<()>) {
        self.inner.lock().unwrap().idle_shutdown = Some(tx);
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Cursors passed to every read, in order.
    pub fn reads(&self) -> Vec<BTreeMap<String, String>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Read { cursors } => Some(cursors),
                _ => None,
            })
            .collect()
    }

    /// `(key, value, seq)` of every successful set, in order.
    pub fn sets(&self) -> Vec<(String, String, u64)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Set { key, value, seq } => Some((key, value, seq)),
                _ => None,
            })
            .collect()
    }

    /// Trim caps passed to every append, in order.
    pub fn append_caps(&self) -> Vec<usize> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Append { max_len, .. } => Some(max_len),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl StreamClient for MockStore {
    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    async fn read(
        &mut self,
        cursors: &BTreeMap<String, String>,
        block: Option<Duration>,
    ) -> NagareResult<Vec<StreamBatch>> {
        let idle_shutdown = {
            let mut inner = self.inner.lock().unwrap();
            if inner.unavailable {
                return Err(unavailable());
            }
            inner.ops.push(StoreOp::Read {
                cursors: cursors.clone(),
            });

            if let Some(batches) = inner.injected.pop_front() {
                return Ok(batches);
            }

            let mut batches = Vec::new();
            for (channel, cursor) in cursors {
                let physical = self.physical(channel);
                let after = parse_id(cursor);
                let entries: Vec<StreamEntry> = inner
                    .streams
                    .get(&physical)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter(|e| parse_id(&e.id) > after)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if !entries.is_empty() {
                    batches.push(StreamBatch {
                        stream: physical,
                        entries,
                    });
                }
            }

            if !batches.is_empty() {
                return Ok(batches);
            }
            inner.idle_shutdown.take()
        };

        if let Some(tx) = idle_shutdown {
            let _ = tx.send(());
            return Ok(Vec::new());
        }

        match block {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
            None => std::future::pending().await,
        }
    }

    async fn append(
        &mut self,
        stream: &str,
        envelope: &Envelope,
        max_len: usize,
    ) -> NagareResult<String> {
        let physical = self.physical(stream);
        let mut inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(unavailable());
        }

        inner.next_id += 1;
        let id = format!("{}-0", inner.next_id);
        inner.ops.push(StoreOp::Append {
            stream: stream.to_string(),
            max_len,
        });

        let entries = inner.streams.entry(physical).or_default();
        entries.push(StreamEntry {
            id: id.clone(),
            envelope: envelope.clone(),
        });
        if max_len > 0 && entries.len() > max_len {
            let excess = entries.len() - max_len;
            entries.drain(..excess);
        }

        Ok(id)
    }
}

#[async_trait]
impl KeyValueStore for MockStore {
    async fn get(&mut self, key: &str) -> NagareResult<Option<String>> {
        let physical = self.physical(key);
        let mut inner = self.inner.lock().unwrap();
        if inner.unavailable {
            return Err(unavailable());
        }
        inner.ops.push(StoreOp::Get {
            key: key.to_string(),
        });
        Ok(inner.kv.get(&physical).cloned())
    }

    async fn set(&mut self, key: &str, value: &str) -> NagareResult<()> {
        let physical = self.physical(key);
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.unavailable {
            return Err(unavailable());
        }
        if let Some(remaining) = inner.sets_before_failure.as_mut() {
            if *remaining == 0 {
                inner.unavailable = true;
                return Err(unavailable());
            }
            *remaining -= 1;
        }

        inner.ops.push(StoreOp::Set {
            key: key.to_string(),
            value: value.to_string(),
            seq: next_seq(),
        });
        inner.kv.insert(physical, value.to_string());
        Ok(())
    }
}

/// Wrap a JSON value in a `data` envelope.
pub fn json_envelope(value: &serde_json::Value) -> Envelope {
    Envelope::from_fields([(DATA_FIELD, serde_json::to_vec(value).unwrap())])
}

/// A handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub channel: String,
    pub message_id: String,
    pub data: MessageData,
    pub seq: u64,
}

/// Handler that records every call.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.message_id).collect()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(
        &self,
        channel: &str,
        message_id: &str,
        data: &MessageData,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(Call {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
            data: data.clone(),
            seq: next_seq(),
        });
        Ok(())
    }
}

/// Handler that always fails with the given message.
#[derive(Clone)]
pub struct FailingHandler {
    message: String,
    calls: Arc<AtomicU64>,
}

impl FailingHandler {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            calls: Arc::default(),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl Handler for FailingHandler {
    async fn handle(
        &self,
        _channel: &str,
        _message_id: &str,
        _data: &MessageData,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        Err(anyhow::anyhow!(self.message.clone()))
    }
}

/// Handler that panics on every message.
#[derive(Clone, Copy, Default)]
pub struct PanickingHandler;

#[async_trait]
impl Handler for PanickingHandler {
    async fn handle(
        &self,
        channel: &str,
        message_id: &str,
        _data: &MessageData,
    ) -> anyhow::Result<()> {
        panic!("handler exploded on {} {}", channel, message_id);
    }
}

/// Sink that keeps every record.
#[derive(Default)]
pub struct RecordingSink {
    successes: Mutex<Vec<SuccessRecord>>,
    failures: Mutex<Vec<FailureRecord>>,
}

impl RecordingSink {
    pub fn successes(&self) -> Vec<SuccessRecord> {
        self.successes.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures.lock().unwrap().clone()
    }
}

impl OutcomeSink for RecordingSink {
    fn log_success(&self, record: &SuccessRecord) {
        self.successes.lock().unwrap().push(record.clone());
    }

    fn log_failure(&self, record: &FailureRecord) {
        self.failures.lock().unwrap().push(record.clone());
    }
}

/// Bind a handler to a name.
pub fn named<H: Handler + 'static>(name: &str, handler: H) -> NamedHandler {
    NamedHandler {
        name: name.to_string(),
        handler: Arc::new(handler),
    }
}

/// Listener over a MockStore with a handler registry built up by the test.
pub struct TestHarness {
    pub store: MockStore,
    pub sink: Arc<RecordingSink>,
    pub registry: HandlerRegistry,
    pub channels: BTreeMap<String, Vec<String>>,
    pub prefix: String,
    pub serializer: Serializer,
    pub options: ListenerOptions,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(MockStore::new())
    }

    pub fn with_store(store: MockStore) -> Self {
        Self {
            store,
            sink: Arc::new(RecordingSink::default()),
            registry: HandlerRegistry::new(),
            channels: BTreeMap::new(),
            prefix: "stream_cursor:".to_string(),
            serializer: Serializer::new(false),
            options: ListenerOptions::default(),
        }
    }

    /// Configure `channel` with the given handler identifiers.
    pub fn channel(&mut self, channel: &str, handlers: &[&str]) -> &mut Self {
        self.channels.insert(
            channel.to_string(),
            handlers.iter().map(|h| h.to_string()).collect(),
        );
        self
    }

    pub fn handler<H: Handler + 'static>(&mut self, name: &str, handler: H) -> &mut Self {
        self.registry.register(name, handler);
        self
    }

    pub fn listener(&self) -> Listener<MockStore, MockStore> {
        let routes = self.registry.resolve(&self.channels).unwrap();
        Listener::new(
            self.store.clone(),
            CheckpointStore::new(self.store.clone(), self.prefix.clone()),
            routes,
            Dispatcher::new(self.serializer, self.sink.clone()),
            self.options.clone(),
        )
    }

    /// Run a listener until the store has nothing left to deliver.
    pub async fn run_until_idle(&self) -> NagareResult<ListenerExit> {
        let (tx, rx) = broadcast::channel(1);
        self.store.shutdown_when_idle(tx.clone());
        let mut listener = self.listener();
        let result = listener.run(rx).await;
        drop(tx);
        result
    }

    /// Persisted cursor of `channel`.
    pub fn checkpoint(&self, channel: &str) -> Option<String> {
        self.store.value(&format!("{}{}", self.prefix, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_id_ordering() {
        assert!(parse_id("1-1") > parse_id("1-0"));
        assert!(parse_id("2-0") > parse_id("1-99"));
        assert_eq!(parse_id("0"), (0, 0));
    }

    #[tokio::test]
    async fn test_mock_store_reads_after_cursor() {
        let mut store = MockStore::with_prefix("app:");
        store.add_json("orders", "1-0", json!({"amount": 5}));
        store.add_json("orders", "1-1", json!({"amount": 7}));

        let mut cursors = BTreeMap::new();
        cursors.insert("orders".to_string(), "1-0".to_string());

        let batches = store.read(&cursors, None).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].stream, "app:orders");
        assert_eq!(batches[0].entries.len(), 1);
        assert_eq!(batches[0].entries[0].id, "1-1");
    }

    #[tokio::test]
    async fn test_mock_store_idle_read_fires_shutdown() {
        let mut store = MockStore::new();
        let (tx, mut rx) = broadcast::channel(1);
        store.shutdown_when_idle(tx);

        let batches = store.read(&BTreeMap::new(), None).await.unwrap();
        assert!(batches.is_empty());
        assert!(rx.try_recv().is_ok());
    }
}
