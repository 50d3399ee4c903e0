//! Poll orchestrator
//!
//! Drives one sequential worker: connect, discover capabilities, read the
//! VIN once per epoch, collect telemetry, report trouble codes, sleep.
//! Nothing in an iteration is fatal; failures are logged and the loop
//! carries on with the next cycle.

use std::sync::Arc;

use obdwatch_core::commands::{CLEAR_DTC, GET_DTC, VIN};
use obdwatch_core::{
    classify, events, normalize, AttrValue, Attributes, DiagnosticTroubleCode, LinkFactory,
    QueryOutcome, RawValue, Reporter,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capability::{CapabilityRegistry, CapabilitySet};
use crate::config::{ConnectionConfig, PollConfig};
use crate::error::PollError;
use crate::shutdown;
use crate::supervisor::ConnectionSupervisor;

/// VIN read during one connection epoch
#[derive(Debug, Clone)]
struct CachedVin {
    epoch: u64,
    vin: Option<String>,
}

/// Result of one poll iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// No link could be established; nothing was queried
    Disconnected,
    /// Iteration completed
    Completed {
        /// Attributes in the telemetry report (0 if none was emitted)
        attributes: usize,
        /// Fault reports emitted
        faults: usize,
    },
}

/// Runs the poll loop against one vehicle
pub struct PollOrchestrator {
    supervisor: ConnectionSupervisor,
    registry: CapabilityRegistry,
    reporter: Reporter,
    config: PollConfig,
    vin: Option<CachedVin>,
    tested_epoch: u64,
}

impl PollOrchestrator {
    pub fn new(
        factory: Arc<dyn LinkFactory>,
        poll: PollConfig,
        connection: ConnectionConfig,
        reporter: Reporter,
    ) -> Self {
        let registry = CapabilityRegistry::new(connection.query_timeout(), reporter.clone());
        let supervisor = ConnectionSupervisor::new(factory, connection, reporter.clone());
        Self {
            supervisor,
            registry,
            reporter,
            config: poll,
            vin: None,
            tested_epoch: 0,
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Poll until `cancel` fires, then close the link
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            report_faults = self.config.report_faults,
            "Poll loop started"
        );

        loop {
            match self.poll_once(&cancel).await {
                Ok(outcome) => debug!(?outcome, "Poll iteration finished"),
                Err(PollError::Cancelled) => break,
                Err(e) => warn!(error = %e, "Poll iteration failed"),
            }
            debug!(health = ?self.supervisor.health(), "Link health");

            if shutdown::sleep(&cancel, self.config.interval()).await.is_err() {
                break;
            }
        }

        self.supervisor.disconnect().await;
        info!("Poll loop stopped");
    }

    /// Run a single iteration.
    ///
    /// Returns [`PollError::Cancelled`] if shutdown was requested part-way;
    /// in that case no telemetry report is emitted for the iteration.
    pub async fn poll_once(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<IterationOutcome, PollError> {
        if !self.supervisor.ensure_connected(cancel).await {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            debug!("Link unavailable, skipping iteration");
            return Ok(IterationOutcome::Disconnected);
        }

        let epoch = self.supervisor.epoch();
        if self.tested_epoch != epoch {
            self.tested_epoch = epoch;
            shutdown::guard(cancel, self.supervisor.test_communication()).await?;
        }

        let link = self.supervisor.link().ok_or(PollError::NotConnected)?;
        let capabilities = self
            .registry
            .ensure_capabilities(epoch, link, cancel)
            .await?;

        let vin = self.ensure_vin(epoch, &capabilities, cancel).await?;
        let attributes = self.collect_telemetry(&capabilities, vin, cancel).await?;

        let faults = if self.config.report_faults {
            self.report_faults(cancel).await?
        } else {
            0
        };

        Ok(IterationOutcome::Completed { attributes, faults })
    }

    /// VIN for `epoch`, read from the vehicle at most once per epoch.
    ///
    /// A failed read is not cached so the next iteration retries it.
    async fn ensure_vin(
        &mut self,
        epoch: u64,
        capabilities: &CapabilitySet,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, PollError> {
        if let Some(cached) = &self.vin {
            if cached.epoch == epoch {
                return Ok(cached.vin.clone());
            }
        }

        if !capabilities.contains(&VIN) {
            debug!(epoch, "VIN not supported");
            self.vin = Some(CachedVin { epoch, vin: None });
            return Ok(None);
        }

        let vin = match shutdown::guard(cancel, self.supervisor.query(&VIN)).await? {
            QueryOutcome::Value(RawValue::Text { value }) => {
                let value = value.trim().to_string();
                (!value.is_empty()).then_some(value)
            }
            QueryOutcome::Value(other) => {
                warn!(kind = other.kind(), "Malformed VIN response");
                None
            }
            QueryOutcome::NoData => None,
            QueryOutcome::Failed(e) => {
                warn!(error = %e, "Failed to read VIN");
                return Ok(None);
            }
        };

        info!(epoch, vin = vin.as_deref().unwrap_or("unknown"), "Vehicle identified");
        self.vin = Some(CachedVin {
            epoch,
            vin: vin.clone(),
        });
        Ok(vin)
    }

    /// Query every telemetry-bearing capability and emit one batched report
    async fn collect_telemetry(
        &self,
        capabilities: &CapabilitySet,
        vin: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<usize, PollError> {
        let mut batch = Attributes::new();

        for command in capabilities.iter() {
            if !command.is_telemetry() || command.name == VIN.name {
                continue;
            }

            let outcome = shutdown::guard(cancel, self.supervisor.query(command)).await?;
            let (response, failure) = outcome.into_response(command);
            if let Some(e) = failure {
                warn!(command = command.name, error = %e, "Query failed");
                continue;
            }

            match normalize::extract(&response) {
                Ok(attributes) => {
                    batch.extend(attributes.into_iter().map(|a| (a.key, a.value)));
                }
                Err(e) => warn!(error = %e, "Dropping malformed response"),
            }
        }

        if let Some(vin) = vin {
            batch.insert(VIN.attribute_key(), AttrValue::Text(vin));
        }

        if batch.is_empty() {
            debug!("No telemetry collected this cycle");
            return Ok(0);
        }

        let count = batch.len();
        self.reporter.emit(events::TELEMETRY_COLLECTED, batch).await;
        debug!(attributes = count, "Telemetry reported");
        Ok(count)
    }

    /// Read stored trouble codes and emit one fault report per code
    async fn report_faults(&self, cancel: &CancellationToken) -> Result<usize, PollError> {
        let codes = match shutdown::guard(cancel, self.supervisor.query(&GET_DTC)).await? {
            QueryOutcome::Value(RawValue::Codes { codes }) => codes,
            QueryOutcome::Value(other) => {
                warn!(kind = other.kind(), "Malformed trouble code response");
                return Ok(0);
            }
            QueryOutcome::NoData => {
                debug!("No trouble codes");
                return Ok(0);
            }
            QueryOutcome::Failed(e) => {
                warn!(error = %e, "Failed to read trouble codes");
                return Ok(0);
            }
        };

        if !codes.is_empty() {
            info!(count = codes.len(), "Trouble codes present");
        }
        for dtc in &codes {
            self.reporter
                .emit(events::VEHICLE_FAULT, fault_attributes(dtc))
                .await;
        }
        Ok(codes.len())
    }

    /// Send CLEAR_DTC, connecting first if needed.
    ///
    /// Returns whether the vehicle acknowledged the request.
    pub async fn clear_faults(&mut self, cancel: &CancellationToken) -> Result<bool, PollError> {
        if !self.supervisor.ensure_connected(cancel).await {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            return Err(PollError::NotConnected);
        }

        match shutdown::guard(cancel, self.supervisor.query(&CLEAR_DTC)).await? {
            QueryOutcome::Value(_) => {
                info!("Trouble codes cleared");
                Ok(true)
            }
            QueryOutcome::NoData => {
                warn!("Vehicle did not acknowledge clearing trouble codes");
                Ok(false)
            }
            QueryOutcome::Failed(e) => Err(e.into()),
        }
    }

    /// Close the link
    pub async fn shutdown(&mut self) {
        self.supervisor.disconnect().await;
    }
}

fn fault_attributes(dtc: &DiagnosticTroubleCode) -> Attributes {
    let classification = classify(&dtc.code);
    let mut attributes = Attributes::new();
    attributes.insert("code".into(), dtc.code.as_str().into());
    attributes.insert("description".into(), dtc.description.as_str().into());
    attributes.insert("category".into(), classification.category.as_str().into());
    attributes.insert("severity".into(), classification.severity.as_str().into());
    attributes.insert("subsystem".into(), classification.subsystem.into());
    attributes.insert("level".into(), classification.report_level().as_str().into());
    attributes.insert("fingerprint".into(), dtc.fingerprint().into());
    attributes
}
