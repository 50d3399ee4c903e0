//! Trouble code classification
//!
//! Derives category, severity and affected subsystem from a DTC string.
//! Total over all inputs: anything that cannot be interpreted yields
//! `unknown` fields.

use crate::models::{Classification, FaultCategory, FaultSeverity};

/// Codes that are always critical, checked before the prefix rule
const CRITICAL_CODES: &[&str] = &[
    "P0301", "P0302", "P0303", "P0304", // cylinder misfire
    "P0171", "P0172", // system too lean / rich
    "P0420", "P0430", // catalyst efficiency below threshold
];

/// Classify a trouble code
///
/// ```
/// use obdwatch_core::{classify, FaultCategory, FaultSeverity};
///
/// let c = classify("P0301");
/// assert_eq!(c.category, FaultCategory::Powertrain);
/// assert_eq!(c.severity, FaultSeverity::Critical);
/// assert_eq!(c.subsystem, "ignition_system");
/// ```
pub fn classify(code: &str) -> Classification {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Classification::UNKNOWN;
    }

    Classification {
        category: category(&code),
        severity: severity(&code),
        subsystem: subsystem(&code),
    }
}

fn category(code: &str) -> FaultCategory {
    match code.as_bytes().first() {
        Some(b'P') => FaultCategory::Powertrain,
        Some(b'B') => FaultCategory::Body,
        Some(b'C') => FaultCategory::Chassis,
        Some(b'U') => FaultCategory::Network,
        _ => FaultCategory::Unknown,
    }
}

/// Severity of a normalized code.
///
/// A code with an unrecognised first letter is `Unknown`, not `Medium`.
/// It still reports at warning level, the same as a medium fault.
fn severity(code: &str) -> FaultSeverity {
    if code.len() < 2 {
        return FaultSeverity::Unknown;
    }
    if CRITICAL_CODES.contains(&code) {
        return FaultSeverity::Critical;
    }

    if code.starts_with("P0") {
        FaultSeverity::High
    } else if code.starts_with("P1") || code.starts_with('B') || code.starts_with('U') {
        FaultSeverity::Medium
    } else if code.starts_with('C') {
        FaultSeverity::Low
    } else if code.starts_with('P') {
        FaultSeverity::Medium
    } else {
        FaultSeverity::Unknown
    }
}

fn subsystem(code: &str) -> &'static str {
    match category(code) {
        FaultCategory::Powertrain => {
            let prefix = code.get(..4).unwrap_or(code);
            match prefix {
                "P030" => "ignition_system",
                "P017" => "fuel_system",
                "P042" => "emissions_catalyst",
                _ => "powertrain",
            }
        }
        FaultCategory::Body => "body_control",
        FaultCategory::Chassis => "chassis_control",
        FaultCategory::Network => "network_communication",
        FaultCategory::Unknown => "unknown",
    }
}
