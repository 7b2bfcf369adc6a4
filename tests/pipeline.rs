//! Pipeline tests against an in-memory source and sink.

use chrono::{DateTime, TimeZone, Utc};
use kafkabeat::testing::{wait_for, MemorySource};
use kafkabeat::{Beat, BeatState};
use kafkabeat_kafka::Error;
use kafkabeat_publisher::{MemorySink, PublishMode, Publisher, PublisherConfig};
use kafkabeat_types::{Codec, Decoder, RawMessage};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Pipeline {
    source: Arc<MemorySource>,
    sink: Arc<MemorySink>,
    shutdown: CancellationToken,
    beat: tokio::task::JoinHandle<(BeatState, anyhow::Result<kafkabeat::BeatReport>)>,
}

fn start(codec: Codec, workers: usize, mode: PublishMode) -> Pipeline {
    let source = Arc::new(MemorySource::new(64));
    let sink = Arc::new(MemorySink::new());
    let publisher = Arc::new(Publisher::new(
        sink.clone(),
        PublisherConfig {
            mode,
            ..Default::default()
        },
    ));
    let shutdown = CancellationToken::new();
    let decoder: Arc<dyn Decoder> = Arc::new(codec);

    let mut beat = Beat::new(
        Arc::clone(&source),
        decoder,
        publisher,
        workers,
        shutdown.clone(),
    );
    assert_eq!(beat.state(), BeatState::Created);

    let handle = tokio::spawn(async move {
        let result = beat.run().await;
        (beat.state(), result)
    });

    Pipeline {
        source,
        sink,
        shutdown,
        beat: handle,
    }
}

impl Pipeline {
    async fn stop(self) -> (Arc<MemorySource>, Arc<MemorySink>, kafkabeat::BeatReport) {
        self.shutdown.cancel();
        let (state, result) = self.beat.await.unwrap();
        assert_eq!(state, BeatState::Stopped);
        (self.source, self.sink, result.unwrap())
    }
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[tokio::test]
async fn test_json_event_takes_embedded_timestamp() {
    let pipeline = start(Codec::Json, 2, PublishMode::Default);
    pipeline
        .source
        .push(RawMessage::new(
            "logs",
            0,
            0,
            r#"{"a":1,"@timestamp":"2024-01-01T00:00:00Z"}"#,
        ))
        .await
        .unwrap();

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(5), || source.marked_count() == 1).await);
    let (_, sink, report) = pipeline.stop().await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timestamp, ts("2024-01-01T00:00:00Z"));
    assert_eq!(serde_json::Value::Object(events[0].fields.clone()), json!({"a": 1}));
    assert_eq!(report.workers.decoded, 1);
    assert_eq!(report.publisher.written, 1);
}

#[tokio::test]
async fn test_plain_event_without_broker_timestamp_uses_now() {
    let pipeline = start(Codec::Plain, 1, PublishMode::Default);
    pipeline
        .source
        .push(RawMessage::new("logs", 0, 0, "hello world").with_timestamp_millis(0))
        .await
        .unwrap();

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(5), || source.marked_count() == 1).await);
    let (_, sink, _) = pipeline.stop().await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        serde_json::Value::Object(events[0].fields.clone()),
        json!({"message": "hello world"})
    );
    let skew = (Utc::now() - events[0].timestamp).num_milliseconds().abs();
    assert!(skew < 5_000, "timestamp {} too far from now", events[0].timestamp);
}

#[tokio::test]
async fn test_malformed_json_is_dropped_but_offset_advances() {
    let pipeline = start(Codec::Json, 1, PublishMode::Default);
    pipeline
        .source
        .push(RawMessage::new("logs", 3, 41, r#"{"a":"#))
        .await
        .unwrap();

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(5), || source.marked_count() == 1).await);
    let (source, sink, report) = pipeline.stop().await;

    assert!(sink.is_empty());
    assert_eq!(source.offsets().committed("logs", 3), Some(41));
    assert_eq!(report.workers.decode_failures, 1);
    assert_eq!(report.publisher.published, 0);
}

#[tokio::test]
async fn test_broker_timestamp_used_without_embedded_one() {
    let broker_ts = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
    let pipeline = start(Codec::Json, 1, PublishMode::GuaranteedSend);
    pipeline
        .source
        .push(RawMessage::new("logs", 0, 0, r#"{"b":"x"}"#).with_timestamp(broker_ts))
        .await
        .unwrap();

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(5), || source.marked_count() == 1).await);
    let (_, sink, _) = pipeline.stop().await;

    assert_eq!(sink.events()[0].timestamp, broker_ts);
}

#[tokio::test]
async fn test_four_workers_process_each_message_once() {
    const PARTITIONS: i32 = 4;
    const PER_PARTITION: i64 = 250;

    let pipeline = start(Codec::Json, 4, PublishMode::GuaranteedSend);
    for offset in 0..PER_PARTITION {
        for partition in 0..PARTITIONS {
            let payload = format!(r#"{{"partition":{partition},"offset":{offset}}}"#);
            pipeline
                .source
                .push(RawMessage::new("events", partition, offset, payload))
                .await
                .unwrap();
        }
    }
    // Closing the stream ends the workers once everything is drained.
    pipeline.source.finish();

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(10), || source.marked_count() == 1000).await);
    let (source, sink, report) = pipeline.stop().await;

    let marked = source.marked();
    assert_eq!(marked.len(), 1000);
    let unique: HashSet<(i32, i64)> = marked.iter().map(|m| (m.partition, m.offset)).collect();
    assert_eq!(unique.len(), 1000);

    for partition in 0..PARTITIONS {
        assert_eq!(
            source.offsets().committed("events", partition),
            Some(PER_PARTITION - 1)
        );
    }

    assert_eq!(sink.len(), 1000);
    assert_eq!(report.workers.received, 1000);
    assert_eq!(report.publisher.written, 1000);
    assert_eq!(report.publisher.dropped(), 0);
}

#[tokio::test]
async fn test_offsets_reach_highest_seen_regardless_of_decode() {
    let pipeline = start(Codec::Json, 3, PublishMode::Default);
    let payloads = [r#"{"ok":1}"#, "not json", r#"{"ok":2}"#, "[1,2]", r#"{"ok":3}"#];
    for (offset, payload) in payloads.iter().enumerate() {
        pipeline
            .source
            .push(RawMessage::new("mixed", 0, offset as i64, *payload))
            .await
            .unwrap();
    }

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(5), || source.marked_count() == payloads.len()).await);
    let (source, sink, report) = pipeline.stop().await;

    assert_eq!(source.offsets().committed("mixed", 0), Some(4));
    assert_eq!(sink.len(), 3);
    assert_eq!(report.workers.decode_failures, 2);
}

#[tokio::test]
async fn test_stop_drains_buffered_messages_and_closes_source_once() {
    let pipeline = start(Codec::Plain, 2, PublishMode::Default);
    for offset in 0..20 {
        pipeline
            .source
            .push(RawMessage::new("t", 0, offset, format!("line {offset}")))
            .await
            .unwrap();
    }

    let (source, sink, report) = pipeline.stop().await;

    // Everything pushed before the stop is still processed.
    assert_eq!(source.marked_count(), 20);
    assert_eq!(sink.len(), 20);
    assert_eq!(report.workers.received, 20);
    assert_eq!(source.close_count(), 1);
    assert!(sink.flush_count() >= 1);
}

#[tokio::test]
async fn test_consumer_errors_are_not_fatal() {
    let pipeline = start(Codec::Plain, 1, PublishMode::Default);
    pipeline
        .source
        .report_error(Error::Consumer("leader not available".into()))
        .unwrap();
    pipeline
        .source
        .push(RawMessage::new("t", 0, 0, "after error"))
        .await
        .unwrap();

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(5), || source.marked_count() == 1).await);
    assert!(!pipeline.beat.is_finished());

    let (_, sink, _) = pipeline.stop().await;
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_closed_error_stream_stops_the_beat() {
    let pipeline = start(Codec::Plain, 1, PublishMode::Default);
    pipeline
        .source
        .push(RawMessage::new("t", 0, 0, "last"))
        .await
        .unwrap();
    pipeline.source.fail();

    let (state, result) = pipeline.beat.await.unwrap();
    assert_eq!(state, BeatState::Stopped);
    let report = result.unwrap();
    assert_eq!(report.workers.received, 1);
    assert_eq!(pipeline.sink.len(), 1);
    assert_eq!(pipeline.source.close_count(), 1);
}

#[tokio::test]
async fn test_zero_workers_still_runs_one() {
    let pipeline = start(Codec::Plain, 0, PublishMode::DropIfFull);
    pipeline
        .source
        .push(RawMessage::new("t", 0, 0, "x"))
        .await
        .unwrap();

    let source = Arc::clone(&pipeline.source);
    assert!(wait_for(Duration::from_secs(5), || source.marked_count() == 1).await);
    let (_, sink, _) = pipeline.stop().await;
    assert_eq!(sink.len(), 1);
}
