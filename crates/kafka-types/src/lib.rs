//! Shared types for kafkabeat.
//!
//! This crate defines the values that flow through the consume, decode and
//! publish pipeline, plus the two decoding schemes.
//!
//! # Architecture
//!
//! ```text
//! broker record → RawMessage → Decoder (json | plain) → Option<Event> → Publisher
//! ```
//!
//! # Modules
//!
//! - [`message`] - `RawMessage`, one record read from a broker partition
//! - [`event`] - `Event`, the structured record handed downstream
//! - [`codec`] - the `Decoder` capability and the `json`/`plain` schemes
//! - [`timestamp`] - flexible timestamp parsing for the reserved `@timestamp` field
//! - [`error`] - error types for decoding and parsing
//!
//! # Example
//!
//! ```
//! use kafkabeat_types::{Codec, Decoder, RawMessage};
//!
//! let msg = RawMessage::new("logs", 0, 42, r#"{"a":1,"@timestamp":"2024-01-01T00:00:00Z"}"#);
//! let event = Codec::Json.decode(&msg).unwrap();
//! assert!(!event.fields.contains_key("@timestamp"));
//! ```

pub mod codec;
pub mod error;
pub mod event;
pub mod message;
pub mod timestamp;

pub use codec::{Codec, Decoder, JsonDecoder, PlainDecoder};
pub use error::{DecodeError, TimestampError, UnknownCodec};
pub use event::{Event, Fields, MESSAGE_FIELD, TIMESTAMP_FIELD};
pub use message::RawMessage;
pub use timestamp::parse_timestamp;
