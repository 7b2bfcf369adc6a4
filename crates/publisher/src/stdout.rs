use crate::traits::EventSink;
use anyhow::{Context, Result};
use kafkabeat_types::Event;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// Writes each event as one JSON line on standard output.
pub struct StdoutSink {
    out: Mutex<Stdout>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn write_events(&self, events: &[Event]) -> Result<()> {
        let buf = render_lines(events);
        let mut out = self.out.lock().await;
        out.write_all(buf.as_bytes())
            .await
            .context("Failed to write events to stdout")?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.out
            .lock()
            .await
            .flush()
            .await
            .context("Failed to flush stdout")
    }
}

/// Newline-terminated JSON document per event.
pub(crate) fn render_lines(events: &[Event]) -> String {
    let mut buf = String::new();
    for event in events {
        buf.push_str(&event.to_json_line());
        buf.push('\n');
    }
    buf
}
