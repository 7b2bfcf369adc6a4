//! Kafka consume → decode → publish E2E test
//!
//! Test flow:
//! 1. Create a topic and publish sample log records, one of them malformed
//! 2. Run the pipeline with a fresh consumer group reading from the oldest offset
//! 3. Wait until every record has been marked processed
//! 4. Stop, then check the written events and the committed offsets

use kafkabeat::{Beat, BeatState};
use kafkabeat_kafka::{ConsumerConfig, InitialOffset, KafkaConsumer};
use kafkabeat_kafka_producer::{publish_test_logs, test_log_records, KafkaTestProducer};
use kafkabeat_publisher::{MemorySink, PublishMode, Publisher, PublisherConfig};
use kafkabeat_types::{Codec, Decoder};
use rdkafka::consumer::Consumer;
use rdkafka::TopicPartitionList;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Kafka broker address for testing
const KAFKA_BROKER: &str = "kafka:9092";

fn test_id() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[tokio::test]
#[ignore = "requires a Kafka broker at kafka:9092"]
async fn test_kafka_consume_publish() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("kafkabeat=debug,kafkabeat_kafka=debug,kafkabeat_publisher=debug")
        .try_init()
        .ok();

    let id = test_id();
    let topic = format!("test-logs-{id}");
    let group = format!("test-group-{id}");

    let producer = KafkaTestProducer::new(KAFKA_BROKER).await?;
    producer.create_topic_if_not_exists(&topic, 1).await?;
    sleep(Duration::from_millis(500)).await;
    let published = publish_test_logs(&producer, &topic).await?;

    let config = ConsumerConfig {
        brokers: vec![KAFKA_BROKER.to_string()],
        topics: vec![topic.clone()],
        group_id: group,
        initial_offset: InitialOffset::Oldest,
        ..Default::default()
    };
    let shutdown = CancellationToken::new();
    let consumer = Arc::new(KafkaConsumer::new(&config, shutdown.child_token())?);

    let sink = Arc::new(MemorySink::new());
    let publisher = Arc::new(Publisher::new(
        sink.clone(),
        PublisherConfig {
            mode: PublishMode::GuaranteedSend,
            ..Default::default()
        },
    ));
    let decoder: Arc<dyn Decoder> = Arc::new(Codec::Json);

    let mut beat = Beat::new(
        Arc::clone(&consumer),
        decoder,
        publisher,
        2,
        shutdown.clone(),
    );
    let run = tokio::spawn(async move {
        let result = beat.run().await;
        (beat.state(), result)
    });

    let last_offset = published as i64 - 1;
    let mut waited = Duration::ZERO;
    while consumer.offsets().committed(&topic, 0) != Some(last_offset) {
        assert!(
            waited < Duration::from_secs(30),
            "timed out waiting for offset {last_offset}"
        );
        sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }

    shutdown.cancel();
    let (state, result) = run.await?;
    assert_eq!(state, BeatState::Stopped);
    let report = result?;

    // The malformed record is dropped; the others arrive without `@timestamp`.
    let expected = test_log_records();
    let events = sink.events();
    assert_eq!(events.len(), expected.len());
    assert_eq!(report.workers.decode_failures, 1);
    for event in &events {
        assert!(!event.fields.contains_key("@timestamp"));
        assert!(event.fields.contains_key("service"));
    }
    assert!(events
        .iter()
        .any(|e| e.timestamp.to_rfc3339() == "2024-01-01T00:00:00+00:00"));

    // The final commit points just past the last record.
    let mut partitions = TopicPartitionList::new();
    partitions.add_partition(&topic, 0);
    let committed = consumer
        .inner()
        .committed_offsets(partitions, Duration::from_secs(5))?
        .find_partition(&topic, 0)
        .map(|p| p.offset());
    assert_eq!(committed, Some(rdkafka::Offset::Offset(published as i64)));

    Ok(())
}
