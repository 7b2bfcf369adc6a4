//! kafkabeat
//!
//! Consumes Kafka topics as a consumer-group member, decodes every record
//! into an event and publishes the events downstream.
//!
//! # Pipeline
//!
//! ```text
//! KafkaConsumer ──MessageStream──▶ N workers ──decode──▶ Publisher ──▶ EventSink
//!       ▲                              │
//!       └──────── mark_processed ──────┘
//! ```
//!
//! - Offsets: every message a worker receives is marked processed, whether
//!   or not it decoded. Offsets are committed after the event is handed to
//!   the publisher, which gives at-least-once delivery.
//! - Ordering: workers share one stream, so two messages of the same
//!   partition may be published out of order.
//! - Delivery: `publish_mode` picks between blocking, timing out and
//!   dropping when the publisher queue is full.
//!
//! # CLI Usage
//!
//! ```bash
//! # Run with a config file
//! kafkabeat run --config kafkabeat.yml
//!
//! # Validate a config file and print the effective settings
//! kafkabeat check --config kafkabeat.yml
//! ```

pub mod beat;
pub mod config;
pub mod testing;
pub mod worker;

pub use beat::{open_sink, run_beat, Beat, BeatReport, BeatState};
pub use config::{Config, ConfigError, OutputConfig, Settings};
pub use worker::{WorkerPool, WorkerStats, WorkerStatsSnapshot};
