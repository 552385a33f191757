//! Payload encoding and decoding.
//!
//! Payloads travel in the `data` field of a stream entry. They are encoded
//! with the binary pack format (CBOR) when it is both enabled in
//! configuration and compiled in, and as JSON otherwise.
//!
//! Decoding never fails: an envelope without `data` yields an empty
//! container, and bytes that do not decode are handed through raw.

use crate::error::{NagareError, NagareResult};
use crate::stream_client::Envelope;
use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the envelope field carrying the payload.
pub const DATA_FIELD: &str = "data";

/// A decoded message payload as seen by handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    /// Structured value.
    Value(Value),
    /// Bytes that could not be decoded, passed through unchanged.
    Raw(Vec<u8>),
}

impl MessageData {
    /// The empty container produced for envelopes without a payload.
    pub fn empty() -> Self {
        MessageData::Value(Value::Object(Map::new()))
    }

    /// The structured value, if decoding succeeded.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            MessageData::Value(value) => Some(value),
            MessageData::Raw(_) => None,
        }
    }

    /// The raw bytes, if decoding degraded to passthrough.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            MessageData::Value(_) => None,
            MessageData::Raw(bytes) => Some(bytes),
        }
    }

    /// JSON rendering used in log records. Raw bytes are rendered lossily.
    pub fn to_log_value(&self) -> Value {
        match self {
            MessageData::Value(value) => value.clone(),
            MessageData::Raw(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// Converts values to and from stream payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer {
    binary_pack: bool,
}

impl Serializer {
    /// Create a serializer; `binary_pack` is the configuration flag.
    pub fn new(binary_pack: bool) -> Self {
        Self { binary_pack }
    }

    /// Whether the binary pack format is in effect (enabled and compiled in).
    pub fn binary_pack_active(&self) -> bool {
        self.binary_pack && cfg!(feature = "binary-pack")
    }

    /// Encode a value into payload bytes.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> NagareResult<Vec<u8>> {
        #[cfg(feature = "binary-pack")]
        if self.binary_pack {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)
                .map_err(|e| NagareError::Serialization(e.to_string()))?;
            return Ok(buf);
        }

        serde_json::to_vec(value).map_err(|e| NagareError::Serialization(e.to_string()))
    }

    /// Decode the payload of an envelope.
    pub fn decode(&self, envelope: &Envelope) -> MessageData {
        match envelope.field(DATA_FIELD) {
            Some(bytes) => self.decode_payload(bytes),
            None => MessageData::empty(),
        }
    }

    /// Decode raw payload bytes, degrading to passthrough on failure.
    pub fn decode_payload(&self, bytes: &[u8]) -> MessageData {
        #[cfg(feature = "binary-pack")]
        if self.binary_pack {
            let mut rest = bytes;
            return match ciborium::from_reader::<Value, _>(&mut rest) {
                Ok(value) if rest.is_empty() => MessageData::Value(value),
                _ => MessageData::Raw(bytes.to_vec()),
            };
        }

        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => MessageData::Value(value),
            Err(_) => MessageData::Raw(bytes.to_vec()),
        }
    }
}
