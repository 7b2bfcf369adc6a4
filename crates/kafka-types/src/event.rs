//! Decoded events.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved field name holding an event's timestamp.
///
/// The JSON codec lifts this key out of the payload; sinks write the event
/// timestamp back under the same name.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Field the plain codec stores the payload text under.
pub const MESSAGE_FIELD: &str = "message";

/// String-keyed field mapping of an event.
pub type Fields = serde_json::Map<String, Value>;

/// A structured record produced from exactly one `RawMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub fields: Fields,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, fields: Fields) -> Self {
        Self { timestamp, fields }
    }

    /// Flatten into the document shape sinks write:
    /// `{"@timestamp": "<RFC3339 millis>", ...fields}`.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        doc.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Value::Object(doc)
    }

    /// Serialize the document form as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> String {
        self.to_document().to_string()
    }
}
