//! Multi-reader message stream.
//!
//! The consumer pushes into one bounded channel; workers share the receiving
//! end. Each message is received by exactly one worker. Once every sender is
//! gone and the buffer is drained, [`MessageStream::next`] returns `None`,
//! which is how workers learn that consumption has stopped.

use kafkabeat_types::RawMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Create a bounded message channel. A capacity of zero is raised to one.
pub fn message_channel(capacity: usize) -> (mpsc::Sender<RawMessage>, MessageStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, MessageStream::new(rx))
}

/// Cloneable receiving side of the message channel.
#[derive(Debug, Clone)]
pub struct MessageStream {
    receiver: Arc<Mutex<mpsc::Receiver<RawMessage>>>,
}

impl MessageStream {
    pub fn new(receiver: mpsc::Receiver<RawMessage>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Wait for the next message, or `None` once the stream is closed and drained.
    pub async fn next(&self) -> Option<RawMessage> {
        self.receiver.lock().await.recv().await
    }
}
