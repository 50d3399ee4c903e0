//! Capability discovery
//!
//! Determines which candidate commands the attached vehicle/adapter pair
//! answers. Probing is slow over Bluetooth, so the result is memoized for
//! the lifetime of one connection epoch.

use std::time::Duration;

use obdwatch_core::{
    events, Attributes, CommandDescriptor, DiagnosticLink, Reporter, CANDIDATES,
    CANDIDATE_TABLE_VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PollError;
use crate::shutdown;

/// Supported commands, in candidate-table order, for one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilitySet {
    epoch: u64,
    commands: Vec<&'static CommandDescriptor>,
}

impl CapabilitySet {
    pub fn new(epoch: u64, commands: Vec<&'static CommandDescriptor>) -> Self {
        Self { epoch, commands }
    }

    /// Epoch the set was discovered in
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn contains(&self, command: &CommandDescriptor) -> bool {
        self.commands.iter().any(|c| c.name == command.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static CommandDescriptor> + '_ {
        self.commands.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.iter().map(|c| c.name).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Memoizes capability discovery per connection epoch
pub struct CapabilityRegistry {
    candidates: &'static [&'static CommandDescriptor],
    probe_timeout: Duration,
    reporter: Reporter,
    cached: Option<CapabilitySet>,
}

impl CapabilityRegistry {
    pub fn new(probe_timeout: Duration, reporter: Reporter) -> Self {
        Self {
            candidates: &CANDIDATES,
            probe_timeout,
            reporter,
            cached: None,
        }
    }

    /// Capabilities for `epoch`, probing `link` only if not yet known.
    ///
    /// A cancelled discovery caches nothing and emits no audit report.
    pub async fn ensure_capabilities(
        &mut self,
        epoch: u64,
        link: &dyn DiagnosticLink,
        cancel: &CancellationToken,
    ) -> Result<CapabilitySet, PollError> {
        if let Some(set) = &self.cached {
            if set.epoch == epoch {
                return Ok(set.clone());
            }
        }

        let set = self.discover(epoch, link, cancel).await?;
        info!(
            epoch,
            supported = set.len(),
            candidates = self.candidates.len(),
            "Capability discovery complete"
        );
        self.report_audit(&set).await;
        self.cached = Some(set.clone());
        Ok(set)
    }

    async fn discover(
        &self,
        epoch: u64,
        link: &dyn DiagnosticLink,
        cancel: &CancellationToken,
    ) -> Result<CapabilitySet, PollError> {
        let mut supported = Vec::new();
        for &command in self.candidates {
            let probe = tokio::time::timeout(self.probe_timeout, link.supports(command));
            match shutdown::guard(cancel, probe).await? {
                Ok(Ok(true)) => supported.push(command),
                Ok(Ok(false)) => debug!(command = command.name, "Not supported"),
                Ok(Err(e)) => {
                    warn!(command = command.name, error = %e, "Capability probe failed")
                }
                Err(_) => warn!(command = command.name, "Capability probe timed out"),
            }
        }
        Ok(CapabilitySet::new(epoch, supported))
    }

    pub fn cached(&self) -> Option<&CapabilitySet> {
        self.cached.as_ref()
    }

    async fn report_audit(&self, set: &CapabilitySet) {
        let mut attributes = Attributes::new();
        for command in self.candidates {
            attributes.insert(
                format!("capability.{}", command.name.to_ascii_lowercase()),
                set.contains(command).into(),
            );
        }
        attributes.insert("supported_count".into(), set.len().into());
        attributes.insert("candidate_count".into(), self.candidates.len().into());
        attributes.insert("epoch".into(), set.epoch.into());
        attributes.insert("table_version".into(), CANDIDATE_TABLE_VERSION.into());
        self.reporter.emit(events::CAPABILITY_AUDIT, attributes).await;
    }
}
