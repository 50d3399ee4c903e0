//! Common error types for links, sinks and normalization

use thiserror::Error;

use crate::commands::ResponseShape;

/// Errors raised by a diagnostic link or its factory
///
/// Every variant is recoverable: the connection supervisor treats them as
/// "link unavailable" and retries with backoff.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Adapter could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Link was closed underneath us
    #[error("Connection closed")]
    ConnectionClosed,

    /// The adapter answered with something it could not decode
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No answer within the allotted time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Command is not known to the adapter driver
    #[error("Command not supported by adapter: {0}")]
    Unsupported(String),
}

/// Errors raised while delivering a report
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while turning a response into attributes
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
    /// Response value does not have the shape the command declares
    #[error("Malformed response for {command}: expected {expected}, got {found}")]
    MalformedResponse {
        command: &'static str,
        expected: ResponseShape,
        found: &'static str,
    },

    /// Numeric response that is NaN or infinite
    #[error("Non-finite value for {command}")]
    NonFinite { command: &'static str },
}
