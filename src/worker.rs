//! Decode/publish workers sharing one message stream.

use kafkabeat_kafka::MessageSource;
use kafkabeat_publisher::{PublishOutcome, Publisher};
use kafkabeat_types::Decoder;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters shared by every worker of a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    received: AtomicU64,
    decoded: AtomicU64,
    decode_failures: AtomicU64,
    mark_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub received: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    pub mark_failures: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            mark_failures: self.mark_failures.load(Ordering::Relaxed),
        }
    }
}

/// A fixed set of tasks reading from the source's message stream.
///
/// Each task loops: take a message, decode it, publish the event if there
/// is one, then mark the message processed. A message that fails to decode
/// is still marked, so a poison record never stalls its partition.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// Spawn `count` workers (at least one).
    pub fn spawn<S, D>(
        count: usize,
        source: Arc<S>,
        decoder: Arc<D>,
        publisher: Arc<Publisher>,
    ) -> Self
    where
        S: MessageSource + ?Sized,
        D: Decoder + ?Sized + 'static,
    {
        let count = count.max(1);
        let stats = Arc::new(WorkerStats::default());
        info!("Spawning {count} workers");

        let handles = (0..count)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&source),
                    Arc::clone(&decoder),
                    Arc::clone(&publisher),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        Self { handles, stats }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for every worker to finish. Workers finish once the message
    /// stream has ended and is drained.
    pub async fn join(self) -> WorkerStatsSnapshot {
        for (id, handle) in self.handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!("Worker {id} ended abnormally: {e}");
            }
        }
        self.stats.snapshot()
    }
}

async fn run_worker<S, D>(
    id: usize,
    source: Arc<S>,
    decoder: Arc<D>,
    publisher: Arc<Publisher>,
    stats: Arc<WorkerStats>,
) where
    S: MessageSource + ?Sized,
    D: Decoder + ?Sized,
{
    let stream = source.messages();
    debug!("Worker {id} started");

    while let Some(message) = stream.next().await {
        stats.received.fetch_add(1, Ordering::Relaxed);

        match decoder.decode(&message) {
            Some(event) => {
                stats.decoded.fetch_add(1, Ordering::Relaxed);
                if let PublishOutcome::Dropped(reason) = publisher.publish(event).await {
                    debug!(
                        "Event from {}/{}@{} dropped: {reason:?}",
                        message.topic, message.partition, message.offset
                    );
                }
            }
            None => {
                stats.decode_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Err(e) = source.mark_processed(&message) {
            stats.mark_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Failed to mark {}/{}@{} processed: {e}",
                message.topic, message.partition, message.offset
            );
        }
    }

    debug!("Worker {id} stopped, message stream ended");
}
