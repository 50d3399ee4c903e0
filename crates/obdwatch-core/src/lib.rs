//! obdwatch-core - Core traits and types for OBD-II vehicle monitoring
//!
//! This crate provides the abstractions shared by the poll loop and the
//! daemon: the diagnostic link and reporting sink traits, the static
//! candidate command table, and the two pure transforms that turn raw
//! vehicle responses into reportable attributes.
//!
//! ```text
//!   DiagnosticLink ──► QueryResponse ──► normalize::extract ──► TelemetryAttribute ─┐
//!                                                                                  ├─► ReportSink
//!   GET_DTC ─────────► DiagnosticTroubleCode ──► classify::classify ──► Classification┘
//! ```

pub mod classify;
pub mod commands;
pub mod error;
pub mod link;
pub mod mac;
pub mod models;
pub mod normalize;
pub mod sink;

pub use classify::classify;
pub use commands::{CommandDescriptor, ResponseShape, CANDIDATES, CANDIDATE_TABLE_VERSION};
pub use error::{LinkError, NormalizeError, SinkError};
pub use link::{DiagnosticLink, LinkFactory};
pub use models::*;
pub use normalize::extract;
pub use sink::{events, to_attributes, Attributes, RecordingSink, Report, ReportSink, Reporter};
