//! The supervisor: startup, error relaying and ordered shutdown.

use crate::config::{OutputConfig, Settings};
use crate::worker::{WorkerPool, WorkerStatsSnapshot};
use anyhow::Context;
use kafkabeat_kafka::{KafkaConsumer, MessageSource};
use kafkabeat_publisher::{EventSink, FileSink, PublishStatsSnapshot, Publisher, StdoutSink};
use kafkabeat_types::Decoder;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Lifecycle of a [`Beat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for BeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BeatState::Created => "created",
            BeatState::Running => "running",
            BeatState::Stopping => "stopping",
            BeatState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters collected when a beat stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeatReport {
    pub workers: WorkerStatsSnapshot,
    pub publisher: PublishStatsSnapshot,
}

/// Wires a message source, a decoder and a publisher together.
///
/// `run` starts the worker pool, then relays source errors to the log
/// until `shutdown` is cancelled or the source's error stream ends. Stop
/// happens in a fixed order:
///
/// 1. the source stops, closing the message stream
/// 2. workers drain what is already buffered and exit
/// 3. the source closes, committing the final offsets
/// 4. the publisher closes, writing out its queue
///
/// Offsets are committed only after every worker has returned, so the last
/// commit covers every message that was handed to the publisher.
pub struct Beat<S: MessageSource + ?Sized> {
    source: Arc<S>,
    decoder: Arc<dyn Decoder>,
    publisher: Arc<Publisher>,
    workers: usize,
    shutdown: CancellationToken,
    state: BeatState,
}

impl<S: MessageSource + ?Sized> Beat<S> {
    pub fn new(
        source: Arc<S>,
        decoder: Arc<dyn Decoder>,
        publisher: Arc<Publisher>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            decoder,
            publisher,
            workers: workers.max(1),
            shutdown,
            state: BeatState::Created,
        }
    }

    pub fn state(&self) -> BeatState {
        self.state
    }

    fn transition(&mut self, next: BeatState) {
        info!("kafkabeat {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run until stopped. A beat runs once; calling this again is an error.
    pub async fn run(&mut self) -> anyhow::Result<BeatReport> {
        if self.state != BeatState::Created {
            anyhow::bail!("kafkabeat already ran (state: {})", self.state);
        }

        let pool = WorkerPool::spawn(
            self.workers,
            Arc::clone(&self.source),
            Arc::clone(&self.decoder),
            Arc::clone(&self.publisher),
        );
        self.transition(BeatState::Running);

        match self.source.take_errors() {
            Some(mut errors) => loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("Stop signal received");
                        break;
                    }
                    received = errors.recv() => match received {
                        Some(e) => error!("Consumer error: {e}"),
                        None => {
                            warn!("Consumer error stream closed, stopping");
                            break;
                        }
                    },
                }
            },
            None => {
                warn!("Consumer error stream unavailable, waiting for stop signal");
                self.shutdown.cancelled().await;
            }
        }

        self.transition(BeatState::Stopping);

        self.source.stop();
        let workers = pool.join().await;

        let consumer_closed = self.source.close().await;
        if let Err(e) = &consumer_closed {
            error!("Failed to close consumer: {e}");
        }
        let publisher_closed = self.publisher.close().await;

        let report = BeatReport {
            workers,
            publisher: self.publisher.stats(),
        };
        self.transition(BeatState::Stopped);
        info!(
            "Received {} messages, decoded {} ({} failed), published {}, dropped {}",
            report.workers.received,
            report.workers.decoded,
            report.workers.decode_failures,
            report.publisher.published,
            report.publisher.dropped()
        );

        consumer_closed.context("Failed to close consumer")?;
        publisher_closed.context("Failed to close publisher")?;
        Ok(report)
    }
}

/// Open the sink named by the `output` settings.
pub async fn open_sink(output: &OutputConfig) -> anyhow::Result<Arc<dyn EventSink>> {
    let sink: Arc<dyn EventSink> = match output {
        OutputConfig::Stdout => Arc::new(StdoutSink::new()),
        OutputConfig::File { path } => Arc::new(FileSink::open(path).await?),
    };
    Ok(sink)
}

/// Build the Kafka-backed pipeline from validated settings and run it until
/// `shutdown` is cancelled.
pub async fn run_beat(
    settings: Settings,
    shutdown: CancellationToken,
) -> anyhow::Result<BeatReport> {
    let sink = open_sink(&settings.output).await?;
    let publisher = Arc::new(Publisher::new(sink, settings.publisher.clone()));

    // The consumer gets a child token: stopping it must not look like a
    // process-wide stop to anything else holding `shutdown`.
    let consumer = match KafkaConsumer::new(&settings.consumer, shutdown.child_token()) {
        Ok(consumer) => Arc::new(consumer),
        Err(e) => {
            if let Err(close_err) = publisher.close().await {
                warn!("Failed to close publisher after startup error: {close_err:#}");
            }
            return Err(e).context("Failed to start Kafka consumer");
        }
    };

    let decoder: Arc<dyn Decoder> = Arc::new(settings.codec);
    info!(
        "Starting kafkabeat: codec {}, publish mode {}, {} workers",
        settings.codec, settings.publisher.mode, settings.workers
    );

    let mut beat = Beat::new(consumer, decoder, publisher, settings.workers, shutdown);
    beat.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySource;
    use kafkabeat_publisher::{MemorySink, PublisherConfig};
    use kafkabeat_types::Codec;

    #[tokio::test]
    async fn test_beat_runs_once() {
        let source = Arc::new(MemorySource::new(4));
        let publisher = Arc::new(Publisher::new(
            Arc::new(MemorySink::new()),
            PublisherConfig::default(),
        ));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut beat = Beat::new(
            Arc::clone(&source),
            Arc::new(Codec::Plain),
            publisher,
            1,
            shutdown,
        );
        let report = beat.run().await.unwrap();
        assert_eq!(report, BeatReport::default());
        assert_eq!(beat.state(), BeatState::Stopped);

        let err = beat.run().await.unwrap_err();
        assert!(err.to_string().contains("already ran"));
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test]
    async fn test_open_stdout_sink() {
        let sink = open_sink(&OutputConfig::Stdout).await.unwrap();
        assert_eq!(sink.name(), "stdout");
    }
}
