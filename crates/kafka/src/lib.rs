//! Kafka consumer-group source for kafkabeat.
//!
//! Features:
//!
//! - Consumer Groups: join a named group and consume a set of topics
//! - Shared Message Stream: any number of workers pull from one bounded stream
//! - Error Stream: connectivity and protocol errors are relayed, not fatal
//! - Offset Tracking: processed offsets only ever move forward per partition

/// Consumer and offset settings, mapped onto librdkafka properties
pub mod config;

/// rdkafka-backed `MessageSource`
///
/// Created from a `ConsumerConfig` and a cancellation token owned by the
/// supervisor.
pub mod consumer;
pub mod error;
pub mod offsets;
pub mod source;
pub mod stream;

// Re-export main types for easy access
pub use config::{ConsumerConfig, InitialOffset};
pub use consumer::KafkaConsumer;
pub use error::{Error, Result};
pub use offsets::{OffsetTracker, TopicPartition};
pub use source::{ErrorStream, MessageSource};
pub use stream::{message_channel, MessageStream};
