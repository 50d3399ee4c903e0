//! Diagnostic link drivers
//!
//! The wire-level adapter protocol lives outside this workspace; the poll
//! loop only sees [`DiagnosticLink`](obdwatch_core::DiagnosticLink). The
//! scripted mock stands in for a vehicle in tests and demo runs.

pub mod mock;

use std::sync::Arc;

use obdwatch_core::LinkFactory;

use crate::config::LinkConfig;
use crate::error::PollError;

pub use mock::{MockLink, MockLinkFactory};

/// Build the link factory selected by configuration
pub fn create_link_factory(config: &LinkConfig) -> Result<Arc<dyn LinkFactory>, PollError> {
    config.validate()?;
    match config {
        LinkConfig::Mock(mock) => Ok(Arc::new(MockLinkFactory::new(mock))),
    }
}
