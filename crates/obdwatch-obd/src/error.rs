//! Poll loop errors

use obdwatch_core::LinkError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PollError {
    /// Shutdown was requested while waiting on the link or a timer
    #[error("Cancelled")]
    Cancelled,

    /// An operation needed a live link and none could be established
    #[error("Not connected to the vehicle")]
    NotConnected,

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}
