use crate::mode::PublishMode;
use crate::stats::{PublishStats, PublishStatsSnapshot};
use crate::traits::EventSink;
use anyhow::Context;
use kafkabeat_types::Event;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for the publisher queue and its drain task.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub mode: PublishMode,
    /// Capacity of the queue between workers and the sink
    pub queue_size: usize,
    /// Maximum number of events per sink write
    pub bulk_max_size: usize,
    /// How long `default` mode waits for queue space before dropping
    pub publish_timeout: Duration,
    /// First delay between `guaranteed_send` write retries
    pub retry_backoff: Duration,
    /// Upper bound for the retry delay
    pub max_retry_backoff: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            mode: PublishMode::Default,
            queue_size: 4096,
            bulk_max_size: 50,
            publish_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(100),
            max_retry_backoff: Duration::from_secs(5),
        }
    }
}

/// Why an event did not make it into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    QueueFull,
    Timeout,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    Dropped(DropReason),
}

/// Hands events to a sink under the configured [`PublishMode`].
///
/// Safe to share between workers (`Arc<Publisher>`). `publish` never returns
/// an error; failures are counted in [`PublishStats`] and logged.
pub struct Publisher {
    mode: PublishMode,
    publish_timeout: Duration,
    sender: mpsc::Sender<Event>,
    stats: Arc<PublishStats>,
    shutdown: CancellationToken,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    /// Start the drain task. Must be called from within a Tokio runtime.
    pub fn new(sink: Arc<dyn EventSink>, config: PublisherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let stats = Arc::new(PublishStats::default());
        let shutdown = CancellationToken::new();

        info!(
            "Publishing to sink '{}' with mode {} (queue size {}, bulk max size {})",
            sink.name(),
            config.mode,
            config.queue_size,
            config.bulk_max_size
        );

        let drain = tokio::spawn(drain(
            receiver,
            sink,
            config.clone(),
            Arc::clone(&stats),
            shutdown.clone(),
        ));

        Self {
            mode: config.mode,
            publish_timeout: config.publish_timeout,
            sender,
            stats,
            shutdown,
            drain: Mutex::new(Some(drain)),
        }
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    pub fn stats(&self) -> PublishStatsSnapshot {
        self.stats.snapshot()
    }

    /// Offer one event to the queue.
    pub async fn publish(&self, event: Event) -> PublishOutcome {
        let result = match self.mode {
            PublishMode::GuaranteedSend => {
                self.sender.send(event).await.map_err(|_| DropReason::Closed)
            }
            PublishMode::DropIfFull => self.sender.try_send(event).map_err(|e| match e {
                TrySendError::Full(_) => DropReason::QueueFull,
                TrySendError::Closed(_) => DropReason::Closed,
            }),
            PublishMode::Default => self
                .sender
                .send_timeout(event, self.publish_timeout)
                .await
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => DropReason::Timeout,
                    SendTimeoutError::Closed(_) => DropReason::Closed,
                }),
        };

        match result {
            Ok(()) => {
                self.stats.record_published();
                PublishOutcome::Queued
            }
            Err(reason) => {
                match reason {
                    DropReason::QueueFull => {
                        self.stats.record_dropped_full();
                        debug!("Publisher queue full, dropping event");
                    }
                    DropReason::Timeout => {
                        self.stats.record_dropped_timeout();
                        warn!(
                            "Publisher queue still full after {:?}, dropping event",
                            self.publish_timeout
                        );
                    }
                    DropReason::Closed => {
                        self.stats.record_dropped_closed();
                        warn!("Publisher is closed, dropping event");
                    }
                }
                PublishOutcome::Dropped(reason)
            }
        }
    }

    /// Stop accepting events, write everything still queued and flush the sink.
    ///
    /// Callers must make sure no `publish` call is in flight. A second call
    /// returns immediately.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        let drain = self
            .drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(drain) = drain else {
            debug!("Publisher already closed");
            return Ok(());
        };
        drain.await.context("Publisher drain task failed")?;

        let stats = self.stats();
        info!(
            "Publisher closed: {} published, {} written, {} dropped, {} lost",
            stats.published,
            stats.written,
            stats.dropped(),
            stats.lost
        );
        Ok(())
    }
}

async fn drain(
    mut receiver: mpsc::Receiver<Event>,
    sink: Arc<dyn EventSink>,
    config: PublisherConfig,
    stats: Arc<PublishStats>,
    shutdown: CancellationToken,
) {
    let bulk_max_size = config.bulk_max_size.max(1);
    let mut closing = false;

    loop {
        let next = if closing {
            receiver.recv().await
        } else {
            tokio::select! {
                event = receiver.recv() => event,
                _ = shutdown.cancelled() => {
                    // Refuse new events; everything already queued is still written.
                    receiver.close();
                    closing = true;
                    receiver.recv().await
                }
            }
        };
        let Some(first) = next else { break };

        let mut batch = Vec::with_capacity(bulk_max_size);
        batch.push(first);
        while batch.len() < bulk_max_size {
            match receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }

        write_batch(sink.as_ref(), &batch, &config, &stats, &shutdown).await;
    }

    if let Err(e) = sink.flush().await {
        error!("Failed to flush sink '{}': {e:#}", sink.name());
    }
    debug!("Publisher drain task stopped");
}

async fn write_batch(
    sink: &dyn EventSink,
    batch: &[Event],
    config: &PublisherConfig,
    stats: &PublishStats,
    shutdown: &CancellationToken,
) {
    let mut backoff = config.retry_backoff;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match sink.write_events(batch).await {
            Ok(()) => {
                stats.record_written(batch.len());
                return;
            }
            Err(e) => e,
        };
        stats.record_write_failure();

        if config.mode != PublishMode::GuaranteedSend {
            error!(
                "Sink '{}' failed to write {} events, dropping them: {err:#}",
                sink.name(),
                batch.len()
            );
            stats.record_lost(batch.len());
            return;
        }

        // While shutting down, one more attempt after cancellation is all we wait for.
        if shutdown.is_cancelled() && attempt > 1 {
            error!(
                "Sink '{}' still failing during shutdown, giving up on {} events after {attempt} attempts: {err:#}",
                sink.name(),
                batch.len()
            );
            stats.record_lost(batch.len());
            return;
        }

        warn!(
            "Sink '{}' write failed (attempt {attempt}), retrying in {backoff:?}: {err:#}",
            sink.name()
        );
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(config.max_retry_backoff);
    }
}
