//! Diagnostic link traits - the seam to the adapter driver
//!
//! The adapter driver (ELM327 over Bluetooth RFCOMM, USB serial, ...) is an
//! external collaborator. It is consumed only through these two traits so
//! the poll loop can run against any driver, or a scripted mock in tests.

use async_trait::async_trait;

use crate::commands::CommandDescriptor;
use crate::error::LinkError;
use crate::models::RawValue;

/// An open connection to an OBD-II adapter
///
/// The underlying transport has a single request/response slot, so callers
/// must never issue concurrent queries against one link.
#[async_trait]
pub trait DiagnosticLink: Send + Sync {
    /// Check whether the adapter still reports a live connection
    async fn is_connected(&self) -> bool;

    /// Check whether the attached vehicle supports a command
    async fn supports(&self, command: &CommandDescriptor) -> Result<bool, LinkError>;

    /// Query a command
    ///
    /// # Returns
    /// `Ok(None)` when the vehicle returned no data, which is not an error.
    async fn query(&self, command: &CommandDescriptor) -> Result<Option<RawValue>, LinkError>;

    /// Release the connection
    async fn close(&self) -> Result<(), LinkError>;

    /// Name of the port the driver bound to
    fn port_name(&self) -> Option<String> {
        None
    }

    /// Name of the OBD protocol negotiated with the vehicle
    fn protocol_name(&self) -> Option<String> {
        None
    }
}

/// Opens diagnostic links
#[async_trait]
pub trait LinkFactory: Send + Sync {
    /// Open a link on `port`, or auto-detect the adapter when `None`
    async fn open(&self, port: Option<&str>) -> Result<Box<dyn DiagnosticLink>, LinkError>;
}
