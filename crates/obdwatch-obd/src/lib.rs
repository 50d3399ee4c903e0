//! obdwatch-obd - Connection supervision and poll loop for OBD-II monitoring
//!
//! This crate drives a [`DiagnosticLink`](obdwatch_core::DiagnosticLink)
//! through its lifecycle and turns what the vehicle reports into sink
//! reports.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     PollOrchestrator                       │
//! │   connect ─► capabilities ─► VIN ─► telemetry ─► faults    │
//! │                                                            │
//! │  ┌──────────────────────┐   ┌──────────────────────────┐   │
//! │  │ ConnectionSupervisor │   │   CapabilityRegistry     │   │
//! │  │ (backoff, epoch)     │   │   (memoized per epoch)   │   │
//! │  └──────────┬───────────┘   └──────────────────────────┘   │
//! │             │                                              │
//! │     ┌───────┴────────┐                                     │
//! │     │ DiagnosticLink │  (driver, or scripted MockLink)     │
//! │     └────────────────┘                                     │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod link;
pub mod orchestrator;
pub mod query;
pub mod shutdown;
pub mod supervisor;

pub use capability::{CapabilityRegistry, CapabilitySet};
pub use config::{ConnectionConfig, LinkConfig, MockLinkConfig, PollConfig};
pub use error::PollError;
pub use link::{create_link_factory, MockLink, MockLinkFactory};
pub use orchestrator::{IterationOutcome, PollOrchestrator};
pub use supervisor::{Backoff, ConnectionSupervisor};
