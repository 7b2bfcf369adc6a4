//! In-process stand-ins for running the pipeline without a broker.
//!
//! [`MemorySource`] implements [`MessageSource`] over an in-memory channel
//! and records every `mark_processed` call, so tests can check offset and
//! exactly-once properties. Pair it with
//! [`MemorySink`](kafkabeat_publisher::MemorySink) on the publishing side.

use kafkabeat_kafka::{
    message_channel, Error, ErrorStream, MessageSource, MessageStream, OffsetTracker, Result,
};
use kafkabeat_types::RawMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// A message source fed by the test itself.
pub struct MemorySource {
    sender: Mutex<Option<mpsc::Sender<RawMessage>>>,
    messages: MessageStream,
    error_sender: Mutex<Option<mpsc::Sender<Error>>>,
    errors: Mutex<Option<ErrorStream>>,
    offsets: OffsetTracker,
    marked: Mutex<Vec<RawMessage>>,
    closes: AtomicUsize,
}

impl MemorySource {
    pub fn new(capacity: usize) -> Self {
        let (sender, messages) = message_channel(capacity);
        let (error_sender, errors) = mpsc::channel(16);
        Self {
            sender: Mutex::new(Some(sender)),
            messages,
            error_sender: Mutex::new(Some(error_sender)),
            errors: Mutex::new(Some(errors)),
            offsets: OffsetTracker::new(),
            marked: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// Enqueue a message, waiting for room. Fails once the source stopped.
    pub async fn push(&self, message: RawMessage) -> Result<()> {
        let sender = lock(&self.sender).clone().ok_or(Error::Closed)?;
        sender.send(message).await.map_err(|_| Error::Closed)
    }

    /// Emit an error on the error stream.
    pub fn report_error(&self, error: Error) -> Result<()> {
        let sender = lock(&self.error_sender).clone().ok_or(Error::Closed)?;
        sender.try_send(error).map_err(|_| Error::Closed)
    }

    /// End the error stream, as a consumer does after a fatal client error.
    pub fn fail(&self) {
        lock(&self.error_sender).take();
    }

    /// No more messages: buffered ones are still delivered.
    pub fn finish(&self) {
        lock(&self.sender).take();
    }

    /// Every message marked processed, in call order.
    pub fn marked(&self) -> Vec<RawMessage> {
        lock(&self.marked).clone()
    }

    pub fn marked_count(&self) -> usize {
        lock(&self.marked).len()
    }

    pub fn offsets(&self) -> &OffsetTracker {
        &self.offsets
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageSource for MemorySource {
    fn messages(&self) -> MessageStream {
        self.messages.clone()
    }

    fn take_errors(&self) -> Option<ErrorStream> {
        lock(&self.errors).take()
    }

    fn mark_processed(&self, message: &RawMessage) -> Result<()> {
        self.offsets
            .advance(&message.topic, message.partition, message.offset);
        lock(&self.marked).push(message.clone());
        Ok(())
    }

    fn stop(&self) {
        self.finish();
    }

    async fn close(&self) -> Result<()> {
        self.stop();
        self.fail();
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// passes. Returns whether it held.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finish_drains_then_ends() {
        let source = MemorySource::new(8);
        source.push(RawMessage::new("t", 0, 1, "a")).await.unwrap();
        source.push(RawMessage::new("t", 0, 2, "b")).await.unwrap();
        source.finish();

        assert!(source.push(RawMessage::new("t", 0, 3, "c")).await.is_err());

        let stream = source.messages();
        assert_eq!(stream.next().await.unwrap().offset, 1);
        assert_eq!(stream.next().await.unwrap().offset, 2);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_mark_processed_tracks_highest_offset() {
        let source = MemorySource::new(8);
        for offset in [3, 1, 7, 5] {
            source
                .mark_processed(&RawMessage::new("t", 2, offset, ""))
                .unwrap();
        }
        assert_eq!(source.offsets().committed("t", 2), Some(7));
        assert_eq!(source.marked_count(), 4);
    }

    #[tokio::test]
    async fn test_close_ends_error_stream() {
        let source = MemorySource::new(8);
        let mut errors = source.take_errors().unwrap();
        assert!(source.take_errors().is_none());

        source
            .report_error(Error::Consumer("broker down".into()))
            .unwrap();
        source.close().await.unwrap();
        source.close().await.unwrap();

        assert!(matches!(errors.recv().await, Some(Error::Consumer(_))));
        assert!(errors.recv().await.is_none());
        assert_eq!(source.close_count(), 2);
    }
}
