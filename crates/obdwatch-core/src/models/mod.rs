//! Shared data models for the monitoring pipeline

mod connection;
mod fault;
mod response;
mod telemetry;

pub use connection::*;
pub use fault::*;
pub use response::*;
pub use telemetry::*;
