//! Connection lifecycle models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the diagnostic link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No link held
    #[default]
    Disconnected,
    /// Link open in progress
    Connecting,
    /// Link open and reporting connected
    Connected,
    /// Last open attempt failed; backoff applies
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of connection health for periodic logging
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkHealth {
    pub state: ConnectionState,
    /// Current connection epoch (0 before the first successful connect)
    pub epoch: u64,
    /// Consecutive failed open attempts
    pub retry_count: u32,
    /// Delay applied after the next failure, in seconds
    pub backoff_secs: f64,
    /// Configured port, `None` for auto-detect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Port the driver actually bound to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
}
