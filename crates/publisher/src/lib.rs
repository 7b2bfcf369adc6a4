//! Event publishing for kafkabeat.
//!
//! This crate defines the `EventSink` trait for downstream destinations and
//! the `Publisher` that hands decoded events to a sink under one of three
//! delivery guarantees (see [`PublishMode`]).
//!
//! The publisher owns a bounded queue and a single drain task. Workers
//! enqueue; the drain task batches queued events into sink writes.

mod file;
mod memory;
mod mode;
mod publisher;
mod stats;
mod stdout;
mod traits;

pub use file::FileSink;
pub use memory::MemorySink;
pub use mode::{PublishMode, UnknownPublishMode};
pub use publisher::{DropReason, PublishOutcome, Publisher, PublisherConfig};
pub use stats::{PublishStats, PublishStatsSnapshot};
pub use stdout::StdoutSink;
pub use traits::EventSink;
