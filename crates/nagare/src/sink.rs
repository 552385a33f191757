//! Outcome records and the sinks that receive them.
//!
//! The dispatcher always writes a one-line console summary through
//! `tracing`. The detailed records below go to an [`OutcomeSink`], which
//! decides per record kind whether and where they are kept.

use crate::config::{NagareConfig, SinkKind};
use crate::error::{NagareError, NagareResult};
use observability::CentralLogWriter;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

/// Target of outcome records written to a `tracing` sink. These events are
/// kept out of the console and only reach the JSONL log.
pub const OUTCOME_TARGET: &str = "nagare::outcome";

/// A message delivered to a handler without error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessRecord {
    pub channel: String,
    pub message_id: String,
    pub data: Value,
    pub summary: String,
}

/// A handler failed on a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub channel: String,
    pub message_id: String,
    pub data: Value,
    pub summary: String,
    pub error_message: String,
    pub error_trace: String,
}

/// Receives structured outcome records.
pub trait OutcomeSink: Send + Sync {
    fn log_success(&self, record: &SuccessRecord);

    fn log_failure(&self, record: &FailureRecord);
}

/// Where one kind of record ends up.
#[derive(Clone)]
enum RecordTarget {
    /// Structured event on the `nagare::outcome` target.
    Tracing { sink: String },
    /// One JSON document per line.
    Jsonl { sink: String, writer: CentralLogWriter },
}

impl RecordTarget {
    fn build(config: &NagareConfig, name: Option<&str>) -> NagareResult<Self> {
        let Some(name) = name else {
            return Ok(RecordTarget::Tracing {
                sink: "default".to_string(),
            });
        };

        let sink = config
            .sinks
            .get(name)
            .ok_or_else(|| NagareError::Config(format!("Logging sink '{}' is not defined", name)))?;

        match (sink.kind, &sink.path) {
            (SinkKind::Tracing, _) => Ok(RecordTarget::Tracing {
                sink: name.to_string(),
            }),
            (SinkKind::Jsonl, Some(path)) => Ok(RecordTarget::Jsonl {
                sink: name.to_string(),
                writer: CentralLogWriter::new(path)?,
            }),
            (SinkKind::Jsonl, None) => Err(NagareError::Config(format!(
                "Sink '{}' of kind jsonl requires a path",
                name
            ))),
        }
    }
}

/// Sink built from the logging section of [`NagareConfig`].
#[derive(Clone)]
pub struct ConfiguredSink {
    success: Option<RecordTarget>,
    failure: Option<RecordTarget>,
}

impl ConfiguredSink {
    /// Resolve the logging flags and named sinks. JSONL files are opened here.
    pub fn from_config(config: &NagareConfig) -> NagareResult<Self> {
        let success = if config.log_success {
            Some(RecordTarget::build(
                config,
                config.log_success_channel.as_deref(),
            )?)
        } else {
            None
        };

        let failure = if config.log_errors {
            Some(RecordTarget::build(
                config,
                config.log_error_channel.as_deref(),
            )?)
        } else {
            None
        };

        Ok(Self { success, failure })
    }

    pub fn logs_success(&self) -> bool {
        self.success.is_some()
    }

    pub fn logs_failures(&self) -> bool {
        self.failure.is_some()
    }
}

impl OutcomeSink for ConfiguredSink {
    fn log_success(&self, record: &SuccessRecord) {
        match &self.success {
            None => {}
            Some(RecordTarget::Tracing { sink }) => {
                info!(
                    target: OUTCOME_TARGET,
                    sink = %sink,
                    channel = %record.channel,
                    message_id = %record.message_id,
                    data = %record.data,
                    "{}",
                    record.summary
                );
            }
            Some(RecordTarget::Jsonl { sink, writer }) => {
                if let Err(e) = writer.append_json(record) {
                    warn!(sink = %sink, error = %e, "Failed to write success record");
                }
            }
        }
    }

    fn log_failure(&self, record: &FailureRecord) {
        match &self.failure {
            None => {}
            Some(RecordTarget::Tracing { sink }) => {
                error!(
                    target: OUTCOME_TARGET,
                    sink = %sink,
                    channel = %record.channel,
                    message_id = %record.message_id,
                    data = %record.data,
                    error_message = %record.error_message,
                    error_trace = %record.error_trace,
                    "{}",
                    record.summary
                );
            }
            Some(RecordTarget::Jsonl { sink, writer }) => {
                if let Err(e) = writer.append_json(record) {
                    warn!(sink = %sink, error = %e, "Failed to write failure record");
                }
            }
        }
    }
}
