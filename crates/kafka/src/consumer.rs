use crate::config::ConsumerConfig;
use crate::error::{Error, Result};
use crate::offsets::{OffsetTracker, TopicPartition};
use crate::source::{ErrorStream, MessageSource};
use crate::stream::{message_channel, MessageStream};
use bytes::Bytes;
use kafkabeat_types::RawMessage;
use rdkafka::consumer::{CommitMode, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka consumer-group member feeding a shared message stream.
///
/// A background pump task moves records from librdkafka into a bounded
/// channel (`channel_buffer_size`) and client errors into a parallel error
/// channel. Workers read the former through [`MessageSource::messages`].
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    offsets: OffsetTracker,
    messages: MessageStream,
    errors: Mutex<Option<ErrorStream>>,
    shutdown: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl KafkaConsumer {
    /// Connect, subscribe and start pumping messages.
    ///
    /// Must be called from within a Tokio runtime. Cancelling `shutdown`
    /// closes the message stream.
    pub fn new(config: &ConsumerConfig, shutdown: CancellationToken) -> Result<Self> {
        config.validate()?;

        let consumer: StreamConsumer = config
            .client_config()
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| Error::Consumer(format!("Failed to subscribe to topics: {e}")))?;

        info!(
            "Joined consumer group '{}' for topics {:?} (initial offset: {})",
            config.group_id, config.topics, config.initial_offset
        );

        let consumer = Arc::new(consumer);
        let (message_tx, messages) = message_channel(config.channel_buffer_size);
        let (error_tx, error_rx) = mpsc::channel(config.channel_buffer_size.max(1));
        let pump = tokio::spawn(pump(
            Arc::clone(&consumer),
            message_tx,
            error_tx,
            shutdown.clone(),
        ));

        Ok(Self {
            consumer,
            offsets: OffsetTracker::new(),
            messages,
            errors: Mutex::new(Some(error_rx)),
            shutdown,
            pump: Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
        })
    }

    /// Processed offsets as seen by this consumer.
    pub fn offsets(&self) -> &OffsetTracker {
        &self.offsets
    }

    /// Get the underlying consumer (for advanced use cases)
    pub fn inner(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Commit list positioned just past every processed offset, restricted
    /// to partitions this member still owns and whose group position is
    /// behind ours.
    ///
    /// A partition revoked in a rebalance keeps its entry in the tracker;
    /// another member may have committed past it since, so it must not be
    /// committed from here.
    fn commit_list(&self) -> Result<TopicPartitionList> {
        let assignment = self.consumer.assignment()?;
        let assigned: HashSet<TopicPartition> = assignment
            .elements()
            .iter()
            .map(|e| TopicPartition::new(e.topic(), e.partition()))
            .collect();

        let committed: HashMap<TopicPartition, i64> = if assigned.is_empty() {
            HashMap::new()
        } else {
            self.consumer
                .committed_offsets(assignment, COMMIT_TIMEOUT)?
                .elements()
                .iter()
                .filter_map(|e| match e.offset() {
                    Offset::Offset(n) => Some((TopicPartition::new(e.topic(), e.partition()), n)),
                    _ => None,
                })
                .collect()
        };

        let mut tpl = TopicPartitionList::new();
        for (tp, next) in final_commit_positions(self.offsets.snapshot(), &assigned, &committed) {
            tpl.add_partition_offset(&tp.topic, tp.partition, Offset::Offset(next))?;
        }
        Ok(tpl)
    }
}

/// Positions to commit on close: one past each processed offset, for
/// assigned partitions only, and only where that moves the group forward.
fn final_commit_positions(
    processed: BTreeMap<TopicPartition, i64>,
    assigned: &HashSet<TopicPartition>,
    committed: &HashMap<TopicPartition, i64>,
) -> Vec<(TopicPartition, i64)> {
    processed
        .into_iter()
        .filter(|(tp, _)| assigned.contains(tp))
        .map(|(tp, offset)| (tp, offset + 1))
        .filter(|(tp, next)| committed.get(tp).map_or(true, |current| next > current))
        .collect()
}

#[async_trait::async_trait]
impl MessageSource for KafkaConsumer {
    fn messages(&self) -> MessageStream {
        self.messages.clone()
    }

    fn take_errors(&self) -> Option<ErrorStream> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn mark_processed(&self, message: &RawMessage) -> Result<()> {
        self.offsets
            .advance_with(&message.topic, message.partition, message.offset, || {
                let mut tpl = TopicPartitionList::new();
                tpl.add_partition_offset(
                    &message.topic,
                    message.partition,
                    Offset::Offset(message.offset + 1),
                )?;
                self.consumer.store_offsets(&tpl)
            })
            .map(|_| ())
            .map_err(Error::from)
    }

    fn stop(&self) {
        self.shutdown.cancel();
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Kafka consumer already closed");
            return Ok(());
        }

        self.stop();
        let pump = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!("Consumer pump task ended abnormally: {e}");
            }
        }

        let committed = self.commit_list().and_then(|tpl| {
            if tpl.count() == 0 {
                return Ok(0);
            }
            self.consumer
                .commit(&tpl, CommitMode::Sync)
                .map_err(|e| Error::Consumer(format!("Failed to commit offsets: {e}")))
                .map(|_| tpl.count())
        });

        self.consumer.unsubscribe();

        let committed = committed?;
        info!("Kafka consumer closed, committed offsets for {committed} partitions");
        Ok(())
    }
}

/// Move records and errors from librdkafka into the worker-facing channels
/// until cancelled, until every reader is gone, or until the client reports
/// a fatal error.
async fn pump(
    consumer: Arc<StreamConsumer>,
    messages: mpsc::Sender<RawMessage>,
    errors: mpsc::Sender<Error>,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = consumer.recv() => received.map(|msg| to_raw_message(&msg)),
        };

        match received {
            Ok(message) => {
                tokio::select! {
                    biased;
                    // Not marked, so the broker redelivers it after restart.
                    _ = shutdown.cancelled() => break,
                    sent = messages.send(message) => {
                        if sent.is_err() {
                            debug!("All message stream readers dropped");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                let fatal = e.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal);
                if let Err(mpsc::error::TrySendError::Full(e)) = errors.try_send(Error::Kafka(e)) {
                    warn!("Consumer error stream full, dropping: {e}");
                }
                if fatal {
                    error!("Fatal Kafka client error, closing message stream");
                    break;
                }
            }
        }
    }
    debug!("Consumer pump stopped");
}

fn to_raw_message(msg: &BorrowedMessage<'_>) -> RawMessage {
    RawMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(Bytes::copy_from_slice),
        payload: msg.payload().map(Bytes::copy_from_slice).unwrap_or_default(),
        timestamp: msg.timestamp().to_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(topic: &str, partition: i32) -> TopicPartition {
        TopicPartition::new(topic, partition)
    }

    fn processed(entries: &[(&str, i32, i64)]) -> BTreeMap<TopicPartition, i64> {
        entries
            .iter()
            .map(|(topic, partition, offset)| (tp(topic, *partition), *offset))
            .collect()
    }

    #[test]
    fn test_final_commit_skips_revoked_partitions() {
        let tracker = OffsetTracker::new();
        tracker.advance("events", 0, 41);
        tracker.advance("events", 1, 9);
        tracker.advance("audit", 0, 3);

        // Partition 1 went to another member in a rebalance.
        let assigned = HashSet::from([tp("events", 0), tp("audit", 0)]);
        let positions = final_commit_positions(tracker.snapshot(), &assigned, &HashMap::new());

        assert_eq!(positions, vec![(tp("audit", 0), 4), (tp("events", 0), 42)]);
    }

    #[test]
    fn test_final_commit_empty_without_assignment() {
        let positions = final_commit_positions(
            processed(&[("events", 0, 41), ("events", 1, 9)]),
            &HashSet::new(),
            &HashMap::new(),
        );
        assert!(positions.is_empty());
    }

    #[test]
    fn test_final_commit_never_moves_group_backwards() {
        let assigned = HashSet::from([tp("events", 0), tp("events", 1), tp("events", 2)]);
        // Partition 0 was reassigned away and back; the group moved past us.
        let committed = HashMap::from([(tp("events", 0), 100), (tp("events", 1), 10)]);

        let positions = final_commit_positions(
            processed(&[("events", 0, 41), ("events", 1, 9), ("events", 2, 0)]),
            &assigned,
            &committed,
        );

        assert_eq!(positions, vec![(tp("events", 2), 1)]);
    }

    #[test]
    fn test_final_commit_advances_lagging_group() {
        let assigned = HashSet::from([tp("events", 0)]);
        let committed = HashMap::from([(tp("events", 0), 30)]);

        let positions =
            final_commit_positions(processed(&[("events", 0, 41)]), &assigned, &committed);

        assert_eq!(positions, vec![(tp("events", 0), 42)]);
    }
}
