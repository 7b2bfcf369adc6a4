//! Error types for kafkabeat-types crate.

use thiserror::Error;

/// Reasons a payload could not be turned into an event.
///
/// Decode failures never leave the worker that hit them; the message is
/// dropped and its offset still advances. These values exist so the drop
/// can be logged with a reason.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// A timestamp string matched none of the accepted layouts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized timestamp format: {0:?}")]
pub struct TimestampError(pub String);

/// A codec name that is neither `json` nor `plain`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown codec: '{0}'")]
pub struct UnknownCodec(pub String);
