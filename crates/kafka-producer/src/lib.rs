//! Kafka producer library for testing kafkabeat
//!
//! This library publishes raw and JSON payloads to Kafka topics so that
//! broker-backed tests can feed a running consumer.
//!
//! ## Features
//!
//! - **Raw payloads**: publish arbitrary bytes with an optional key and timestamp
//! - **JSON payloads**: publish any `Serialize` value as a JSON document
//! - **Topic management**: create topics before a test starts consuming
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kafkabeat_kafka_producer::KafkaTestProducer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let producer = KafkaTestProducer::new("localhost:9092").await?;
//!     producer.create_topic_if_not_exists("app-logs", 3).await?;
//!
//!     producer
//!         .publish_json("app-logs", Some("web-1"), &serde_json::json!({
//!             "level": "info",
//!             "@timestamp": "2024-01-01T00:00:00Z",
//!         }))
//!         .await?;
//!     producer.publish("app-logs", None, b"plain text line", None).await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::Serialize;
use std::time::Duration;

// Test data helpers module
pub mod testdata;

pub use testdata::{
    publish_test_lines, publish_test_logs, test_log_records, LogRecord, TEST_LOG_LINES,
};

/// Kafka producer wrapper for testing
pub struct KafkaTestProducer {
    producer: FutureProducer,
    broker: String,
}

impl KafkaTestProducer {
    /// Create a new Kafka test producer
    pub async fn new(broker: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("message.timeout.ms", "5000")
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer,
            broker: broker.to_string(),
        })
    }

    /// Create Kafka topic if it doesn't exist
    pub async fn create_topic_if_not_exists(&self, topic: &str, partitions: i32) -> Result<()> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.broker)
            .create()
            .context("Failed to create admin client")?;

        let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

        let results = admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create topics: {e}"))?;

        for result in results {
            match result {
                Ok(topic_name) => {
                    tracing::info!("Topic '{topic_name}' created successfully");
                }
                Err((topic_name, err)) => {
                    if err.to_string().contains("already exists") {
                        tracing::info!("Topic '{topic_name}' already exists");
                    } else {
                        return Err(anyhow::anyhow!("Failed to create topic: {err}"));
                    }
                }
            }
        }

        Ok(())
    }

    /// Publish raw bytes. `timestamp_millis` sets the record's create time;
    /// without it the broker client stamps the record itself.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        timestamp_millis: Option<i64>,
    ) -> Result<()> {
        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        if let Some(ts) = timestamp_millis {
            record = record.timestamp(ts);
        }

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| err)
            .context("Failed to send message to Kafka")?;

        tracing::debug!("Published {} bytes to {topic}: {delivery:?}", payload.len());
        Ok(())
    }

    /// Publish a value serialized as a JSON document.
    pub async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &T,
    ) -> Result<()> {
        let payload = serde_json::to_vec(value).context("Failed to encode JSON message")?;
        self.publish(topic, key, &payload, None).await
    }
}
