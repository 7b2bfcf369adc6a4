//! Message decoding schemes.
//!
//! A [`Decoder`] turns one [`RawMessage`] into zero or one [`Event`]. The
//! scheme is picked once from configuration ([`Codec`]) and never changes
//! while the process runs. Decoders hold no mutable state, so a single
//! instance is shared by every worker without locking.

use crate::error::{DecodeError, UnknownCodec};
use crate::event::{Event, Fields, MESSAGE_FIELD, TIMESTAMP_FIELD};
use crate::message::RawMessage;
use crate::timestamp::parse_timestamp;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Decode one message.
pub trait Decoder: Send + Sync {
    /// Returns `None` when the message cannot be represented as an event.
    fn decode(&self, message: &RawMessage) -> Option<Event>;
}

/// Decoding scheme selected by the `codec` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Json,
    Plain,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Plain => "plain",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Codec::Json),
            "plain" => Ok(Codec::Plain),
            other => Err(UnknownCodec(other.to_string())),
        }
    }
}

impl Decoder for Codec {
    fn decode(&self, message: &RawMessage) -> Option<Event> {
        match self {
            Codec::Json => JsonDecoder.decode(message),
            Codec::Plain => PlainDecoder.decode(message),
        }
    }
}

/// Parses the payload as a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    /// Decode, reporting why a payload was rejected.
    ///
    /// A top-level `@timestamp` key is always removed from the fields. If its
    /// value is a string that parses as a timestamp it becomes the event
    /// timestamp; otherwise the default timestamp rule applies. A bare `null`
    /// payload decodes to an event with no fields.
    pub fn try_decode(&self, message: &RawMessage) -> Result<Event, DecodeError> {
        let mut fields = match serde_json::from_slice::<Value>(&message.payload)? {
            Value::Object(map) => map,
            Value::Null => Fields::new(),
            other => return Err(DecodeError::NotAnObject(json_kind(&other))),
        };

        let explicit = fields
            .remove(TIMESTAMP_FIELD)
            .and_then(|value| match value {
                Value::String(s) => parse_timestamp(&s)
                    .map_err(|e| debug!("ignoring {TIMESTAMP_FIELD}: {e}"))
                    .ok(),
                _ => None,
            });

        let timestamp = explicit.unwrap_or_else(|| default_timestamp(message));
        Ok(Event::new(timestamp, fields))
    }
}

impl Decoder for JsonDecoder {
    fn decode(&self, message: &RawMessage) -> Option<Event> {
        match self.try_decode(message) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(
                    "dropping message {}/{}@{}: {e}",
                    message.topic, message.partition, message.offset
                );
                None
            }
        }
    }
}

/// Wraps the payload text in a single `message` field. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainDecoder;

impl Decoder for PlainDecoder {
    fn decode(&self, message: &RawMessage) -> Option<Event> {
        let mut fields = Fields::new();
        // Invalid UTF-8 sequences become U+FFFD rather than dropping the message.
        fields.insert(
            MESSAGE_FIELD.to_string(),
            Value::String(String::from_utf8_lossy(&message.payload).into_owned()),
        );
        Some(Event::new(default_timestamp(message), fields))
    }
}

/// Broker timestamp when present and non-zero, else the wall clock.
fn default_timestamp(message: &RawMessage) -> DateTime<Utc> {
    message.broker_timestamp().unwrap_or_else(Utc::now)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
