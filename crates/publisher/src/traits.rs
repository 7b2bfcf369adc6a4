//! EventSink trait definition.
//!
//! This trait abstracts over downstream destinations, allowing the
//! publisher to be written once for stdout, files and in-memory capture.

use anyhow::Result;
use kafkabeat_types::Event;

/// Trait for writing events to a downstream destination.
///
/// # Usage Pattern
///
/// The publisher holds the sink as `Arc<dyn EventSink>` and is the only
/// caller; writes never overlap.
///
/// ```ignore
/// let sink: Arc<dyn EventSink> = Arc::new(StdoutSink::new());
/// let publisher = Publisher::new(sink, PublisherConfig::default());
/// ```
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Write a batch of events.
    ///
    /// An error means none of the batch should be considered delivered.
    async fn write_events(&self, events: &[Event]) -> Result<()>;

    /// Push buffered output to its destination.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
