//! Fan-out of one message to its channel's handlers.

use crate::handler::NamedHandler;
use crate::serializer::{MessageData, Serializer};
use crate::sink::{FailureRecord, OutcomeSink, SuccessRecord};
use crate::stream_client::Envelope;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Per-message handler outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Decodes a message once and invokes every handler for it in order.
///
/// Each handler runs in isolation: an error or panic in one is logged and
/// the next handler still runs. Handlers run sequentially on the caller's
/// task, so a handler that never returns stalls the listener.
pub struct Dispatcher {
    serializer: Serializer,
    sink: Arc<dyn OutcomeSink>,
}

impl Dispatcher {
    pub fn new(serializer: Serializer, sink: Arc<dyn OutcomeSink>) -> Self {
        Self { serializer, sink }
    }

    pub async fn dispatch(
        &self,
        handlers: &[NamedHandler],
        channel: &str,
        message_id: &str,
        envelope: &Envelope,
    ) -> DispatchReport {
        let data = self.serializer.decode(envelope);
        if data.as_raw().is_some() {
            debug!(
                channel = %channel,
                message_id = %message_id,
                "Payload did not decode, passing raw bytes"
            );
        }

        let mut report = DispatchReport::default();

        for named in handlers {
            let outcome = AssertUnwindSafe(named.handler.handle(channel, message_id, &data))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    report.succeeded += 1;
                    self.on_success(&named.name, channel, message_id, &data);
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    self.on_failure(
                        &named.name,
                        channel,
                        message_id,
                        &data,
                        e.to_string(),
                        format!("{:?}", e),
                    );
                }
                Err(panic) => {
                    report.failed += 1;
                    let message = panic_message(panic.as_ref());
                    let trace = format!("handler '{}' panicked: {}", named.name, message);
                    self.on_failure(&named.name, channel, message_id, &data, message, trace);
                }
            }
        }

        report
    }

    fn on_success(&self, handler: &str, channel: &str, message_id: &str, data: &MessageData) {
        let summary = format!(
            "message consumed - channel: [{}]  message ID: [{}]",
            channel, message_id
        );
        info!(handler = %handler, "{}", summary);

        self.sink.log_success(&SuccessRecord {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
            data: data.to_log_value(),
            summary,
        });
    }

    fn on_failure(
        &self,
        handler: &str,
        channel: &str,
        message_id: &str,
        data: &MessageData,
        error_message: String,
        error_trace: String,
    ) {
        error!(
            handler = %handler,
            error = %error_message,
            "error: fail consume - channel: [{}]  message ID: [{}]",
            channel,
            message_id
        );

        self.sink.log_failure(&FailureRecord {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
            data: data.to_log_value(),
            summary: format!(
                "message consumed - channel: [{}]  message ID: [{}]",
                channel, message_id
            ),
            error_message,
            error_trace,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
