//! Wiring of configuration, Redis and handlers into a running listener.

use crate::checkpoint::CheckpointStore;
use crate::config::NagareConfig;
use crate::dispatcher::Dispatcher;
use crate::error::NagareResult;
use crate::handler::HandlerRegistry;
use crate::listener::{Listener, ListenerExit, ListenerOptions};
use crate::producer::Producer;
use crate::redis_store::RedisStore;
use crate::serializer::Serializer;
use crate::sink::ConfiguredSink;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Build a Redis-backed listener from configuration.
///
/// Fails on configuration errors (unknown handler, undefined sink or
/// connection) and when Redis cannot be reached.
pub async fn build_listener(
    config: &NagareConfig,
    registry: &HandlerRegistry,
    channel: Option<String>,
) -> NagareResult<Listener<RedisStore, RedisStore>> {
    config.validate()?;

    let routes = registry.resolve(&config.channels)?;
    let sink = ConfiguredSink::from_config(config)?;
    let serializer = Serializer::new(config.support_binary_pack);

    info!(
        binary_pack = serializer.binary_pack_active(),
        log_success = sink.logs_success(),
        log_errors = sink.logs_failures(),
        "Listener configuration loaded"
    );

    let store = RedisStore::connect(config.connection()?).await?;
    let checkpoints = CheckpointStore::new(store.clone(), config.prefix.clone());

    Ok(Listener::new(
        store,
        checkpoints,
        routes,
        Dispatcher::new(serializer, Arc::new(sink)),
        ListenerOptions {
            channel,
            block_timeout: config.block_timeout(),
        },
    ))
}

/// Build the listener and run it until shutdown or a fatal error.
pub async fn run_listener(
    config: &NagareConfig,
    registry: &HandlerRegistry,
    channel: Option<String>,
    shutdown: broadcast::Receiver<()>,
) -> NagareResult<ListenerExit> {
    let mut listener = build_listener(config, registry, channel).await?;
    listener.run(shutdown).await
}

/// Send on `shutdown` once `signal` resolves.
///
/// If the signal cannot be awaited, the sender is held for the rest of the
/// process so the listener is not stopped by a closed channel.
pub async fn forward_signal<F>(signal: F, shutdown: broadcast::Sender<()>)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal");
            let _ = shutdown.send(());
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
            drop(shutdown);
        }
    }
}

/// Build a Redis-backed producer from configuration.
pub async fn build_producer(config: &NagareConfig) -> NagareResult<Producer<RedisStore>> {
    let store = RedisStore::connect(config.connection()?).await?;

    Ok(Producer::new(
        store,
        Serializer::new(config.support_binary_pack),
        config.trim.clone(),
    ))
}
