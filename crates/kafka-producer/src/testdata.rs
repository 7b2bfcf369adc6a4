//! Test data publishing helpers for Kafka integration tests
//!
//! Log-shaped JSON records (with and without `@timestamp`), one malformed
//! document, and plain text lines.

use crate::KafkaTestProducer;
use anyhow::Result;
use serde::Serialize;

/// Structured log line as an application would emit it.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: String,
    pub service: String,
    pub message: String,
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Plain text lines published by [`publish_test_lines`].
pub const TEST_LOG_LINES: [&str; 3] = [
    "GET /index.html 200",
    "POST /api/login 401",
    "worker 3 restarted",
];

/// Sample records: two carry their own timestamp, one relies on the record
/// timestamp.
pub fn test_log_records() -> Vec<LogRecord> {
    vec![
        LogRecord {
            level: "info".to_string(),
            service: "checkout".to_string(),
            message: "order placed".to_string(),
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
        },
        LogRecord {
            level: "warn".to_string(),
            service: "checkout".to_string(),
            message: "payment retry".to_string(),
            timestamp: Some("2024-01-01T00:00:05.250Z".to_string()),
        },
        LogRecord {
            level: "error".to_string(),
            service: "search".to_string(),
            message: "index unavailable".to_string(),
            timestamp: None,
        },
    ]
}

/// Publish [`test_log_records`] followed by one malformed JSON payload.
///
/// Returns the number of messages published.
pub async fn publish_test_logs(producer: &KafkaTestProducer, topic: &str) -> Result<usize> {
    let records = test_log_records();
    for record in &records {
        producer
            .publish_json(topic, Some(&record.service), record)
            .await?;
        tracing::debug!("Published log record: {}", record.message);
    }

    producer.publish(topic, None, br#"{"level":"#, None).await?;
    tracing::debug!("Published malformed log record");

    Ok(records.len() + 1)
}

/// Publish [`TEST_LOG_LINES`] as plain text.
pub async fn publish_test_lines(producer: &KafkaTestProducer, topic: &str) -> Result<usize> {
    for line in TEST_LOG_LINES {
        producer.publish(topic, None, line.as_bytes(), None).await?;
    }
    Ok(TEST_LOG_LINES.len())
}
