//! Message handlers and their registry.

use crate::error::{NagareError, NagareResult};
use crate::serializer::MessageData;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Receives every message of the channels it is configured for.
///
/// Returning an error (or panicking) marks this delivery as failed. The
/// failure is logged and the remaining handlers still run; the message is
/// not redelivered.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, channel: &str, message_id: &str, data: &MessageData)
        -> anyhow::Result<()>;
}

/// A handler bound to the identifier it was registered under.
#[derive(Clone)]
pub struct NamedHandler {
    pub name: String,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for NamedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Configured channel -> handlers, in registration order.
pub type Routes = BTreeMap<String, Vec<NamedHandler>>;

/// Handler identifiers available to configuration.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the handlers shipped with nagare.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LogHandler::NAME, LogHandler);
        registry
    }

    /// Register `handler` under `name`, replacing any previous entry.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: Handler + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Resolve the configured channel map into routes.
    ///
    /// Every identifier must be registered; an unknown one is a
    /// configuration error reported before any message is read.
    pub fn resolve(&self, channels: &BTreeMap<String, Vec<String>>) -> NagareResult<Routes> {
        let mut routes = Routes::new();

        for (channel, names) in channels {
            let mut handlers = Vec::with_capacity(names.len());
            for name in names {
                let handler = self.handlers.get(name).ok_or_else(|| {
                    NagareError::Config(format!(
                        "Handler '{}' for channel '{}' is not registered",
                        name, channel
                    ))
                })?;
                handlers.push(NamedHandler {
                    name: name.clone(),
                    handler: Arc::clone(handler),
                });
            }
            routes.insert(channel.clone(), handlers);
        }

        Ok(routes)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

/// Built-in handler that writes every message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl LogHandler {
    pub const NAME: &'static str = "log";
}

#[async_trait]
impl Handler for LogHandler {
    async fn handle(
        &self,
        channel: &str,
        message_id: &str,
        data: &MessageData,
    ) -> anyhow::Result<()> {
        info!(
            channel = %channel,
            message_id = %message_id,
            data = %data.to_log_value(),
            "Message received"
        );
        Ok(())
    }
}
