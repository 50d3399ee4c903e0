//! Poll loop configuration
//!
//! Sections of the daemon's TOML file that belong to the poll loop:
//! `[poll]`, `[connection]` and `[link]`. Every field has a default so an
//! empty file yields a runnable setup against the scripted demo vehicle.

use std::collections::BTreeMap;
use std::time::Duration;

use obdwatch_core::{commands, RawValue, StatusRecord};
use serde::{Deserialize, Serialize};

use crate::error::PollError;

// =============================================================================
// Poll Configuration
// =============================================================================

/// Poll cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between the end of one iteration and the start of the next
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Query GET_DTC and report faults every cycle
    #[serde(default = "default_report_faults")]
    pub report_faults: bool,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_report_faults() -> bool {
    true
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            report_faults: default_report_faults(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), PollError> {
        if self.interval_secs == 0 {
            return Err(PollError::InvalidConfig(
                "poll.interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Connection Configuration
// =============================================================================

/// Link lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port of the adapter, `None` to let the driver auto-detect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Delay after the first failed connect
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    /// Upper bound for the doubling backoff
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Upper bound for a single `supports`/`query` call
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_initial_backoff_secs() -> u64 {
    30
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_query_timeout_ms() -> u64 {
    5000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: None,
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), PollError> {
        if self.initial_backoff_secs == 0 {
            return Err(PollError::InvalidConfig(
                "connection.initial_backoff_secs must be greater than zero".into(),
            ));
        }
        if self.max_backoff_secs < self.initial_backoff_secs {
            return Err(PollError::InvalidConfig(format!(
                "connection.max_backoff_secs ({}) is below initial_backoff_secs ({})",
                self.max_backoff_secs, self.initial_backoff_secs
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(PollError::InvalidConfig(
                "connection.query_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Link Configuration
// =============================================================================

/// Which diagnostic link driver to use
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LinkConfig {
    /// Scripted demo vehicle
    Mock(MockLinkConfig),
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::Mock(MockLinkConfig::default())
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<(), PollError> {
        match self {
            LinkConfig::Mock(mock) => mock.validate(),
        }
    }
}

/// Scripted vehicle behind the mock link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockLinkConfig {
    /// Commands the vehicle answers `supports` with true
    #[serde(default = "default_supported")]
    pub supported: Vec<String>,
    /// VIN returned for the VIN command
    #[serde(default = "default_vin", skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    /// Stored trouble codes as `[code, description]` pairs
    #[serde(default)]
    pub dtcs: Vec<(String, String)>,
    /// Per-command overrides of the built-in demo values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, RawValue>,
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_supported() -> Vec<String> {
    [
        "STATUS",
        "ENGINE_LOAD",
        "COOLANT_TEMP",
        "RPM",
        "SPEED",
        "INTAKE_TEMP",
        "THROTTLE_POS",
        "RUN_TIME",
        "FUEL_LEVEL",
        "CONTROL_MODULE_VOLTAGE",
        "VIN",
        "GET_DTC",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_vin() -> Option<String> {
    Some("1HGCM82633A004352".to_string())
}

impl Default for MockLinkConfig {
    fn default() -> Self {
        Self {
            supported: default_supported(),
            vin: default_vin(),
            dtcs: Vec::new(),
            responses: BTreeMap::new(),
            latency_ms: 0,
        }
    }
}

impl MockLinkConfig {
    /// Every configured command name must exist in the candidate table
    pub fn validate(&self) -> Result<(), PollError> {
        let names = self.supported.iter().chain(self.responses.keys());
        for name in names {
            let known = commands::candidate(name).is_some()
                || name.eq_ignore_ascii_case(commands::CLEAR_DTC.name);
            if !known {
                return Err(PollError::InvalidConfig(format!(
                    "link: unknown command '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Value the demo vehicle returns for `name`, before overrides
    pub(crate) fn demo_value(&self, name: &str) -> Option<RawValue> {
        if let Some(value) = self
            .responses
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
        {
            return Some(value);
        }

        let value = match name {
            "STATUS" => RawValue::Status(StatusRecord {
                mil: !self.dtcs.is_empty(),
                dtc_count: self.dtcs.len() as u32,
                ignition_type: "spark".to_string(),
            }),
            "FUEL_STATUS" => RawValue::text("Closed loop, using oxygen sensor feedback"),
            "ENGINE_LOAD" => RawValue::quantity(32.5, "percent"),
            "COOLANT_TEMP" => RawValue::quantity(88.0, "degC"),
            "SHORT_FUEL_TRIM_1" => RawValue::quantity(1.6, "percent"),
            "LONG_FUEL_TRIM_1" => RawValue::quantity(-2.3, "percent"),
            "INTAKE_PRESSURE" => RawValue::quantity(34.0, "kilopascal"),
            "RPM" => RawValue::quantity(850.0, "revolutions_per_minute"),
            "SPEED" => RawValue::quantity(0.0, "kph"),
            "TIMING_ADVANCE" => RawValue::quantity(12.0, "degree"),
            "INTAKE_TEMP" => RawValue::quantity(24.0, "degC"),
            "MAF" => RawValue::quantity(3.9, "gps"),
            "THROTTLE_POS" => RawValue::quantity(14.9, "percent"),
            "RUN_TIME" => RawValue::quantity(412.0, "second"),
            "FUEL_LEVEL" => RawValue::quantity(61.2, "percent"),
            "DISTANCE_W_MIL" => RawValue::quantity(0.0, "kilometer"),
            "BAROMETRIC_PRESSURE" => RawValue::quantity(101.0, "kilopascal"),
            "CATALYST_TEMP_B1S1" => RawValue::quantity(402.5, "degC"),
            "CONTROL_MODULE_VOLTAGE" => RawValue::quantity(14.2, "volt"),
            "FUEL_TYPE" => RawValue::text("Gasoline"),
            "HYBRID_BATTERY_REMAINING" => RawValue::quantity(0.0, "percent"),
            "OIL_TEMP" => RawValue::quantity(92.0, "degC"),
            "VIN" => RawValue::text(self.vin.clone()?),
            "GET_DTC" => RawValue::codes(self.dtcs.iter().cloned()),
            "CLEAR_DTC" => RawValue::text("OK"),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_sections() {
        let poll: PollConfig = toml::from_str("").unwrap();
        assert_eq!(poll.interval(), Duration::from_secs(300));
        assert!(poll.report_faults);

        let connection: ConnectionConfig = toml::from_str("").unwrap();
        assert_eq!(connection.port, None);
        assert_eq!(connection.initial_backoff(), Duration::from_secs(30));
        assert_eq!(connection.max_backoff(), Duration::from_secs(300));
        assert_eq!(connection.query_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_mock_link_config() {
        let toml_str = r#"
type = "mock"
supported = ["RPM", "VIN", "GET_DTC"]
vin = "WVWZZZ1JZXW000001"
dtcs = [["P0171", "System Too Lean (Bank 1)"]]
latency_ms = 20

[responses.RPM]
kind = "quantity"
magnitude = 2500.0
unit = "rpm"
"#;
        let config: LinkConfig = toml::from_str(toml_str).unwrap();
        let LinkConfig::Mock(mock) = config;
        assert_eq!(mock.supported, vec!["RPM", "VIN", "GET_DTC"]);
        assert_eq!(mock.latency_ms, 20);
        assert_eq!(mock.demo_value("RPM"), Some(RawValue::quantity(2500.0, "rpm")));
        assert_eq!(
            mock.demo_value("VIN"),
            Some(RawValue::text("WVWZZZ1JZXW000001"))
        );
        assert!(mock.validate().is_ok());
    }

    #[test]
    fn test_status_follows_dtcs() {
        let mock = MockLinkConfig {
            dtcs: vec![("P0301".into(), "Cylinder 1 Misfire Detected".into())],
            ..Default::default()
        };
        match mock.demo_value("STATUS") {
            Some(RawValue::Status(status)) => {
                assert!(status.mil);
                assert_eq!(status.dtc_count, 1);
            }
            other => panic!("unexpected status value: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let poll = PollConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert!(poll.validate().is_err());

        let connection = ConnectionConfig {
            initial_backoff_secs: 60,
            max_backoff_secs: 30,
            ..Default::default()
        };
        assert!(connection.validate().is_err());

        let mock = MockLinkConfig {
            supported: vec!["RPM".into(), "WARP_DRIVE".into()],
            ..Default::default()
        };
        assert!(matches!(
            mock.validate(),
            Err(PollError::InvalidConfig(msg)) if msg.contains("WARP_DRIVE")
        ));
    }
}
