//! Local report sinks
//!
//! The daemon ships two sinks: `log` turns each report into a tracing
//! event, `jsonl` appends one JSON object per report to a file (or stdout)
//! for a forwarder to pick up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use obdwatch_core::{AttrValue, Attributes, ReportSink, SinkError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Sink selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Emit reports as tracing events
    #[default]
    Log,
    /// Append JSON lines to `path`, or stdout when unset
    Jsonl {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
}

/// Build the configured sink
pub async fn create_sink(config: &SinkConfig) -> Result<Arc<dyn ReportSink>, SinkError> {
    match config {
        SinkConfig::Log => Ok(Arc::new(LogSink)),
        SinkConfig::Jsonl { path: Some(path) } => Ok(Arc::new(JsonLinesSink::open(path).await?)),
        SinkConfig::Jsonl { path: None } => Ok(Arc::new(JsonLinesSink::stdout())),
    }
}

/// Writes each report as a structured log line
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn report(&self, event: &str, attributes: &Attributes) -> Result<(), SinkError> {
        let fields = serde_json::to_string(attributes)?;
        match attributes.get("level") {
            Some(AttrValue::Text(level)) if level == "error" => {
                error!(target: "obdwatch::report", event, attributes = %fields, "Report")
            }
            Some(AttrValue::Text(level)) if level == "warning" => {
                warn!(target: "obdwatch::report", event, attributes = %fields, "Report")
            }
            _ => info!(target: "obdwatch::report", event, attributes = %fields, "Report"),
        }
        Ok(())
    }
}

/// One line of the JSON lines output
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub attributes: Attributes,
}

/// Appends reports as JSON lines
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed
    pub async fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::with_writer(Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::with_writer(Box::new(tokio::io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl ReportSink for JsonLinesSink {
    async fn report(&self, event: &str, attributes: &Attributes) -> Result<(), SinkError> {
        let record = ReportRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event: event.to_string(),
            attributes: attributes.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obdwatch_core::events;

    fn fault() -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("code".into(), "P0171".into());
        attributes.insert("level".into(), "error".into());
        attributes
    }

    #[tokio::test]
    async fn test_jsonl_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");

        let sink = JsonLinesSink::open(&path).await.unwrap();
        sink.report(events::VEHICLE_FAULT, &fault()).await.unwrap();
        sink.report(events::TELEMETRY_COLLECTED, &Attributes::new())
            .await
            .unwrap();
        drop(sink);

        // Reopening appends rather than truncating
        let sink = JsonLinesSink::open(&path).await.unwrap();
        sink.report(events::CONNECTION_STATUS, &Attributes::new())
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<ReportRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].event, events::VEHICLE_FAULT);
        assert_eq!(records[0].attributes["code"], AttrValue::Text("P0171".into()));
        assert_eq!(records[2].event, events::CONNECTION_STATUS);
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_reports() {
        let sink = create_sink(&SinkConfig::Log).await.unwrap();
        assert!(sink.report(events::VEHICLE_FAULT, &fault()).await.is_ok());
    }
}
