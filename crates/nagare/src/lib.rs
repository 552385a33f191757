//! nagare: checkpointed listener for Redis Streams.
//!
//! nagare reads a set of configured channels (Redis Streams), hands every
//! message to the handlers registered for its channel, and records the id of
//! the last processed message per channel so a restarted process resumes
//! where it left off.
//!
//! # Guarantees
//!
//! 1. **Checkpoint after dispatch**: a message's id is persisted only after
//!    all of its handlers have run
//! 2. **Sequential**: messages are applied one at a time, in store order,
//!    with a checkpoint after each one
//! 3. **Isolated handlers**: a failing handler never blocks its siblings or
//!    the loop
//! 4. **Broadcast**: every process tracks its own cursors; there is no
//!    consumer group
//!
//! # Architecture
//!
//! ```text
//! Redis Streams -> Listener -> Dispatcher -> Handlers
//!      ^             |
//!      |__ SET <prefix><channel> <id>
//! ```

pub mod app;
pub mod checkpoint;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod listener;
pub mod normalizer;
pub mod paths;
pub mod producer;
pub mod redis_store;
pub mod serializer;
pub mod sink;
pub mod stream_client;

#[cfg(test)]
mod tests;

pub use checkpoint::{CheckpointStore, START_CURSOR};
pub use config::NagareConfig;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{NagareError, NagareResult};
pub use handler::{Handler, HandlerRegistry, LogHandler};
pub use listener::{Listener, ListenerExit, ListenerOptions};
pub use normalizer::ChannelNormalizer;
pub use producer::Producer;
pub use redis_store::RedisStore;
pub use serializer::{MessageData, Serializer};
pub use sink::{ConfiguredSink, FailureRecord, OutcomeSink, SuccessRecord};
pub use stream_client::{Envelope, KeyValueStore, StreamBatch, StreamClient, StreamEntry};
