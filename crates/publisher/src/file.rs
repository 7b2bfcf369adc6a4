use crate::stdout::render_lines;
use crate::traits::EventSink;
use anyhow::{Context, Result};
use kafkabeat_types::Event;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

/// Appends each event as one JSON line to a file.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open output file {path:?}"))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl EventSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write_events(&self, events: &[Event]) -> Result<()> {
        let buf = render_lines(events);
        self.writer
            .lock()
            .await
            .write_all(buf.as_bytes())
            .await
            .with_context(|| format!("Failed to write events to {:?}", self.path))
    }

    async fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .flush()
            .await
            .with_context(|| format!("Failed to flush {:?}", self.path))?;
        writer
            .get_ref()
            .sync_data()
            .await
            .with_context(|| format!("Failed to sync {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use kafkabeat_types::Fields;

    #[tokio::test]
    async fn test_file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut fields = Fields::new();
        fields.insert("message".to_string(), serde_json::json!("hello world"));
        let event = Event::new(ts, fields);

        let sink = FileSink::open(&path).await.unwrap();
        sink.write_events(&[event.clone(), event.clone()]).await.unwrap();
        sink.flush().await.unwrap();

        // Reopening appends rather than truncating.
        let sink = FileSink::open(&path).await.unwrap();
        sink.write_events(&[event]).await.unwrap();
        sink.flush().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let doc: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(
                doc,
                serde_json::json!({"@timestamp": "2024-01-01T00:00:00.000Z", "message": "hello world"})
            );
        }
    }
}
