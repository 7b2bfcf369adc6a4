//! Kafka message types.
//!
//! `RawMessage` is the undecoded record handed from the consumer to a worker.
//! It is shared between the consumer crate, the worker pool and the codecs.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One record read from a broker partition.
///
/// Immutable once built. The consumer owns it until it is received from the
/// message stream; from then on the receiving worker owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Bytes>,
    /// Raw message value
    pub payload: Bytes,
    /// Broker-assigned timestamp in milliseconds since epoch (if available)
    pub timestamp: Option<i64>,
}

impl RawMessage {
    /// Create a message without key or broker timestamp.
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: payload.into(),
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_timestamp_millis(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    pub fn with_timestamp(self, ts: DateTime<Utc>) -> Self {
        self.with_timestamp_millis(ts.timestamp_millis())
    }

    /// The broker timestamp, if present and non-zero.
    ///
    /// Brokers running old protocol versions report no timestamp or zero;
    /// both are treated as absent.
    pub fn broker_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.timestamp {
            Some(millis) if millis != 0 => DateTime::from_timestamp_millis(millis),
            _ => None,
        }
    }
}
