//! The consumer contract the worker pool and supervisor are written against.

use crate::error::{Error, Result};
use crate::stream::MessageStream;
use kafkabeat_types::RawMessage;
use tokio::sync::mpsc;

/// Connectivity and protocol errors reported by a source.
pub type ErrorStream = mpsc::Receiver<Error>;

/// A consumer-group member producing raw messages.
///
/// # Contract
///
/// - [`messages`](Self::messages) may be called any number of times; all
///   returned streams share one underlying queue.
/// - [`mark_processed`](Self::mark_processed) is called concurrently by every
///   worker, for every message received, whether or not it decoded. It must
///   never move a partition's position backwards.
/// - [`stop`](Self::stop) closes the message stream. Messages already
///   buffered are still delivered, then the stream ends.
/// - [`close`](Self::close) stops, flushes pending offsets and releases the
///   broker connection. Calling it twice is harmless.
#[async_trait::async_trait]
pub trait MessageSource: Send + Sync + 'static {
    /// The shared inbound message stream.
    fn messages(&self) -> MessageStream;

    /// Take the error stream. Only the first call returns `Some`.
    ///
    /// The stream ends when the source stops producing.
    fn take_errors(&self) -> Option<ErrorStream>;

    /// Advance the partition's position past `message`.
    fn mark_processed(&self, message: &RawMessage) -> Result<()>;

    /// Stop producing messages.
    fn stop(&self);

    /// Stop, flush offsets and disconnect.
    async fn close(&self) -> Result<()>;
}
