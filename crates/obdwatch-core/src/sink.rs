//! Reporting sink abstraction
//!
//! The remote backend is consumed through [`ReportSink`]. Components never
//! call a sink directly; they go through a [`Reporter`], which adds static
//! tags and swallows delivery failures so a flaky uplink can never stall
//! the poll loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::SinkError;
use crate::models::{AttrValue, TelemetryAttribute};

/// Attribute map sent with every report (ordered for stable output)
pub type Attributes = BTreeMap<String, AttrValue>;

/// Event names understood by the backend
pub mod events {
    /// One per connection epoch: which candidates the vehicle supports
    pub const CAPABILITY_AUDIT: &str = "capability_audit";
    /// Link established or lost
    pub const CONNECTION_STATUS: &str = "connection_status";
    /// Batched telemetry for one poll cycle
    pub const TELEMETRY_COLLECTED: &str = "telemetry_collected";
    /// One per trouble code per poll cycle
    pub const VEHICLE_FAULT: &str = "vehicle_fault";
}

/// Structured-reporting interface to the monitoring backend
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, event: &str, attributes: &Attributes) -> Result<(), SinkError>;
}

/// Fire-and-forget handle around a sink
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
    tags: Attributes,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            tags: Attributes::new(),
        }
    }

    /// Add a tag sent with every report. Report attributes win on conflict.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Deliver a report, logging (not propagating) failures
    pub async fn emit(&self, event: &str, mut attributes: Attributes) {
        for (key, value) in &self.tags {
            attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        if let Err(e) = self.sink.report(event, &attributes).await {
            warn!(event, error = %e, "Report delivery failed");
        }
    }
}

/// Collect attributes into a report map
pub fn to_attributes<I>(attributes: I) -> Attributes
where
    I: IntoIterator<Item = TelemetryAttribute>,
{
    attributes.into_iter().map(|a| (a.key, a.value)).collect()
}

/// A report captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub event: String,
    pub attributes: Attributes,
}

/// In-memory sink that records every report
///
/// Used by tests and by the daemon's dry-run paths.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail (reports are still recorded)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All reports so far
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Reports with the given event name
    pub fn events(&self, event: &str) -> Vec<Report> {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn report(&self, event: &str, attributes: &Attributes) -> Result<(), SinkError> {
        self.reports.lock().push(Report {
            event: event.to_string(),
            attributes: attributes.clone(),
        });

        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Delivery("sink unavailable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reporter_adds_tags_without_overriding() {
        let sink = Arc::new(RecordingSink::new());
        let reporter = Reporter::new(sink.clone())
            .with_tag("device.id", "pi-01")
            .with_tag("code", "tag-loses");

        let mut attrs = Attributes::new();
        attrs.insert("code".into(), "P0171".into());
        reporter.emit(events::VEHICLE_FAULT, attrs).await;

        let reports = sink.events(events::VEHICLE_FAULT);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].attributes["device.id"], AttrValue::from("pi-01"));
        assert_eq!(reports[0].attributes["code"], AttrValue::from("P0171"));
    }

    #[tokio::test]
    async fn test_reporter_swallows_delivery_failure() {
        let sink = Arc::new(RecordingSink::new());
        sink.set_failing(true);
        let reporter = Reporter::new(sink.clone());

        reporter.emit(events::CONNECTION_STATUS, Attributes::new()).await;

        assert_eq!(sink.reports().len(), 1);
    }

    #[test]
    fn test_to_attributes() {
        let attrs = to_attributes(vec![
            TelemetryAttribute::new("vehicle.rpm", 2500.0),
            TelemetryAttribute::new("vehicle.rpm.unit", "rpm"),
        ]);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["vehicle.rpm"], AttrValue::Float(2500.0));
    }
}
