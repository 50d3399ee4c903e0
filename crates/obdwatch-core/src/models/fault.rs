//! Fault models (trouble codes and their classification)

use serde::{Deserialize, Serialize};

/// A diagnostic trouble code as read from the vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticTroubleCode {
    /// Code string, letter + 4 digits (e.g. "P0171")
    pub code: String,
    /// Free-text description supplied by the vehicle/driver
    #[serde(default)]
    pub description: String,
}

impl DiagnosticTroubleCode {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Grouping key so repeated occurrences of one code collapse together
    pub fn fingerprint(&self) -> String {
        format!("dtc:{}", self.code.trim().to_ascii_uppercase())
    }
}

/// Fault category derived from the first character of a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultCategory {
    /// P codes - engine, transmission
    Powertrain,
    /// B codes - airbags, climate control
    Body,
    /// C codes - ABS, suspension
    Chassis,
    /// U codes - bus communication
    Network,
    Unknown,
}

impl FaultCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCategory::Powertrain => "powertrain",
            FaultCategory::Body => "body",
            FaultCategory::Chassis => "chassis",
            FaultCategory::Network => "network",
            FaultCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fault severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultSeverity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl FaultSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultSeverity::Critical => "critical",
            FaultSeverity::High => "high",
            FaultSeverity::Medium => "medium",
            FaultSeverity::Low => "low",
            FaultSeverity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FaultSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level a fault is raised at in the reporting sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportLevel {
    Error,
    Warning,
}

impl ReportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportLevel::Error => "error",
            ReportLevel::Warning => "warning",
        }
    }
}

/// Derived metadata for one trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: FaultCategory,
    pub severity: FaultSeverity,
    /// Affected subsystem label (e.g. "ignition_system")
    pub subsystem: &'static str,
}

impl Classification {
    /// Classification for input that cannot be interpreted
    pub const UNKNOWN: Classification = Classification {
        category: FaultCategory::Unknown,
        severity: FaultSeverity::Unknown,
        subsystem: "unknown",
    };

    /// Sink level: critical and high faults are errors, the rest warnings
    pub fn report_level(&self) -> ReportLevel {
        match self.severity {
            FaultSeverity::Critical | FaultSeverity::High => ReportLevel::Error,
            _ => ReportLevel::Warning,
        }
    }
}
