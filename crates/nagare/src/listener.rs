//! The consumption loop.
//!
//! ```text
//! INIT ──> WAITING ──> PROCESSING ──┐
//!   │         ^                     │
//!   │         └─────────────────────┘
//!   └──> exit (no channels / channel not found)
//! ```
//!
//! Every message is applied in strict sequence: update the in-memory
//! cursor, dispatch to handlers, then persist the checkpoint, before the
//! next message (even within one read batch) is looked at. A crash therefore
//! redelivers at most the message that was in flight.

use crate::checkpoint::{CheckpointStore, START_CURSOR};
use crate::dispatcher::Dispatcher;
use crate::error::NagareResult;
use crate::handler::Routes;
use crate::normalizer::ChannelNormalizer;
use crate::stream_client::{KeyValueStore, StreamBatch, StreamClient};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

/// Why the listener returned without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// No channels are configured; nothing was read.
    NoChannels,
    /// The selected channel is not configured; nothing was read.
    ChannelNotFound(String),
    /// The shutdown signal was received.
    Shutdown,
}

impl ListenerExit {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ListenerExit::Shutdown => 0,
            ListenerExit::NoChannels | ListenerExit::ChannelNotFound(_) => 1,
        }
    }
}

/// Static listener settings.
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    /// Restrict consumption to this configured channel.
    pub channel: Option<String>,
    /// Blocking read timeout; `None` blocks indefinitely.
    pub block_timeout: Option<Duration>,
}

/// Single-consumer, checkpointed reader over all configured channels.
pub struct Listener<C, K> {
    client: C,
    checkpoints: CheckpointStore<K>,
    routes: Routes,
    dispatcher: Dispatcher,
    normalizer: ChannelNormalizer,
    options: ListenerOptions,
    cursors: BTreeMap<String, String>,
}

impl<C, K> Listener<C, K>
where
    C: StreamClient,
    K: KeyValueStore,
{
    pub fn new(
        client: C,
        checkpoints: CheckpointStore<K>,
        routes: Routes,
        dispatcher: Dispatcher,
        options: ListenerOptions,
    ) -> Self {
        let normalizer = ChannelNormalizer::new(client.key_prefix());

        Self {
            client,
            checkpoints,
            routes,
            dispatcher,
            normalizer,
            options,
            cursors: BTreeMap::new(),
        }
    }

    /// Current in-memory cursors, by channel.
    pub fn cursors(&self) -> &BTreeMap<String, String> {
        &self.cursors
    }

    /// Run until shutdown, a startup misconfiguration, or a fatal store error.
    ///
    /// The shutdown signal is honoured between read cycles and while blocked
    /// in a read; a batch that is being processed always completes first.
    /// A closed shutdown channel counts as a shutdown request.
    pub async fn run(
        &mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> NagareResult<ListenerExit> {
        if let Some(exit) = self.init().await? {
            return Ok(exit);
        }

        info!(
            channels = ?self.cursors.keys().collect::<Vec<_>>(),
            block_timeout_ms = self.options.block_timeout.map(|d| d.as_millis() as u64),
            "Starting stream listener loop"
        );

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => {
                    info!("Shutdown requested, stopping listener");
                    return Ok(ListenerExit::Shutdown);
                }
            }

            let batches = tokio::select! {
                result = self.client.read(&self.cursors, self.options.block_timeout) => result?,
                _ = shutdown.recv() => {
                    info!("Shutdown requested while waiting, stopping listener");
                    return Ok(ListenerExit::Shutdown);
                }
            };

            if batches.is_empty() {
                debug!("No messages available, continuing to poll...");
                continue;
            }

            self.process(batches).await?;
        }
    }

    /// INIT: select channels and seed cursors from the checkpoint store.
    async fn init(&mut self) -> NagareResult<Option<ListenerExit>> {
        if self.routes.is_empty() {
            warn!("no channels defined on config file.");
            return Ok(Some(ListenerExit::NoChannels));
        }

        let selected: Vec<String> = match &self.options.channel {
            Some(name) if !self.routes.contains_key(name) => {
                warn!(channel = %name, "the selected channel is not exists.");
                return Ok(Some(ListenerExit::ChannelNotFound(name.clone())));
            }
            Some(name) => vec![name.clone()],
            None => self.routes.keys().cloned().collect(),
        };

        self.cursors.clear();
        for channel in selected {
            let cursor = self.checkpoints.get(&channel, START_CURSOR).await?;
            debug!(channel = %channel, cursor = %cursor, "Seeded cursor");
            self.cursors.insert(channel, cursor);
        }

        Ok(None)
    }

    /// PROCESSING: apply one read result in store order.
    async fn process(&mut self, batches: Vec<StreamBatch>) -> NagareResult<()> {
        for batch in batches {
            let channel = self.normalizer.normalize(&batch.stream).to_string();

            let Some(handlers) = self.routes.get(&channel) else {
                debug!(stream = %batch.stream, "Skipping unconfigured channel");
                continue;
            };

            for entry in batch.entries {
                self.cursors.insert(channel.clone(), entry.id.clone());

                self.dispatcher
                    .dispatch(handlers, &channel, &entry.id, &entry.envelope)
                    .await;

                self.checkpoints.set(&channel, &entry.id).await?;
            }
        }

        Ok(())
    }
}
