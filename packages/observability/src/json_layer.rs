//! JSONL rendering of tracing events.
//!
//! Each event becomes one line:
//!
//! ```json
//! {"ts":"...","level":"INFO","service":"nagare","target":"nagare::dispatcher",
//!  "message":"message consumed ...","channel":"orders","message_id":"1-0",
//!  "fields":{"handler":"log"}}
//! ```
//!
//! `channel` and `message_id` are lifted out of the field map so stream
//! activity can be filtered with a plain `jq 'select(.channel == "orders")'`.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// One rendered event.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub ts: String,
    pub level: String,
    pub service: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Names of the enclosing spans, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    channel: Option<String>,
    message_id: Option<String>,
    fields: BTreeMap<String, Value>,
}

impl EntryVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(s)) => self.message = s,
            ("channel", Value::String(s)) => self.channel = Some(s),
            ("message_id", Value::String(s)) => self.message_id = Some(s),
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EntryVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON number form
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

/// Layer writing every event as a [`LogEntry`] line through `make_writer`.
pub struct JsonLayer<W> {
    service_name: String,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, make_writer: W) -> Self {
        Self {
            service_name,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let spans = ctx
            .event_scope(event)
            .map(|scope| {
                scope
                    .from_root()
                    .map(|span| span.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let metadata = event.metadata();
        let entry = LogEntry {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: metadata.level().as_str().to_string(),
            service: self.service_name.clone(),
            target: metadata.target().to_string(),
            message: visitor.message,
            channel: visitor.channel,
            message_id: visitor.message_id,
            spans,
            fields: visitor.fields,
        };

        let Ok(mut line) = serde_json::to_vec(&entry) else {
            return;
        };
        line.push(b'\n');
        let _ = self.make_writer.make_writer().write_all(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn lines(buffer: &Buffer) -> Vec<Value> {
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_stream_context_is_lifted() {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLayer::new("nagare".to_string(), buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("listener");
            let _guard = span.enter();
            tracing::info!(
                channel = %"orders",
                message_id = %"1-0",
                handler = "log",
                attempts = 1u64,
                "message consumed"
            );
        });

        let entries = lines(&buffer);
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry["service"], "nagare");
        assert_eq!(entry["level"], "INFO");
        assert_eq!(entry["message"], "message consumed");
        assert_eq!(entry["channel"], "orders");
        assert_eq!(entry["message_id"], "1-0");
        assert_eq!(entry["spans"], serde_json::json!(["listener"]));
        assert_eq!(entry["fields"]["handler"], "log");
        assert_eq!(entry["fields"]["attempts"], 1);
        assert!(entry["fields"].get("channel").is_none());
    }

    #[test]
    fn test_event_without_context_omits_optional_keys() {
        let entry = LogEntry {
            ts: "2024-01-15T10:30:00.000Z".to_string(),
            level: "WARN".to_string(),
            service: "nagare".to_string(),
            target: "nagare::listener".to_string(),
            message: "no channels defined on config file.".to_string(),
            channel: None,
            message_id: None,
            spans: Vec::new(),
            fields: BTreeMap::new(),
        };

        let json = serde_json::to_value(&entry).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 5);
        assert!(json.get("channel").is_none());
        assert!(json.get("fields").is_none());
    }
}
