//! Static candidate command table
//!
//! The names must match the identifiers understood by the diagnostic link
//! driver. Bump [`CANDIDATE_TABLE_VERSION`] whenever an entry is added,
//! removed or reordered, since capability audits are compared fleet-wide.

use serde::Serialize;

/// Version of the candidate table, included in capability audit reports
pub const CANDIDATE_TABLE_VERSION: u32 = 1;

/// Shape of the value a command returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseShape {
    /// Physical quantity with an optional unit (RPM, temperatures, ...)
    ScalarWithUnit,
    /// ASCII identifier or enumerated text (VIN, fuel type, ...)
    String,
    /// Monitor status record (MIL, stored DTC count, ignition type)
    BitfieldStatus,
    /// List of trouble codes with descriptions
    CodeList,
}

impl std::fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResponseShape::ScalarWithUnit => "scalar-with-unit",
            ResponseShape::String => "string",
            ResponseShape::BitfieldStatus => "bitfield-status",
            ResponseShape::CodeList => "code-list",
        };
        f.write_str(s)
    }
}

/// A queryable diagnostic parameter
#[derive(Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CommandDescriptor {
    /// Stable identifier shared with the link driver (e.g. "RPM")
    pub name: &'static str,
    /// Shape of the value returned by the link
    pub shape: ResponseShape,
    /// Human-readable description
    pub description: &'static str,
}

impl CommandDescriptor {
    const fn new(name: &'static str, shape: ResponseShape, description: &'static str) -> Self {
        Self {
            name,
            shape,
            description,
        }
    }

    /// Attribute key for this command: `vehicle.<lowercased name>`
    pub fn attribute_key(&self) -> String {
        format!("vehicle.{}", self.name.to_ascii_lowercase())
    }

    /// Whether responses to this command feed the telemetry batch.
    ///
    /// Code lists are reported as individual faults instead.
    pub fn is_telemetry(&self) -> bool {
        self.shape != ResponseShape::CodeList
    }
}

impl std::fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

use ResponseShape::{BitfieldStatus, CodeList, ScalarWithUnit, String as Text};

pub static STATUS: CommandDescriptor =
    CommandDescriptor::new("STATUS", BitfieldStatus, "Monitor status since DTCs cleared");
pub static FUEL_STATUS: CommandDescriptor =
    CommandDescriptor::new("FUEL_STATUS", Text, "Fuel system status");
pub static ENGINE_LOAD: CommandDescriptor =
    CommandDescriptor::new("ENGINE_LOAD", ScalarWithUnit, "Calculated engine load");
pub static COOLANT_TEMP: CommandDescriptor =
    CommandDescriptor::new("COOLANT_TEMP", ScalarWithUnit, "Engine coolant temperature");
pub static SHORT_FUEL_TRIM_1: CommandDescriptor =
    CommandDescriptor::new("SHORT_FUEL_TRIM_1", ScalarWithUnit, "Short term fuel trim - bank 1");
pub static LONG_FUEL_TRIM_1: CommandDescriptor =
    CommandDescriptor::new("LONG_FUEL_TRIM_1", ScalarWithUnit, "Long term fuel trim - bank 1");
pub static INTAKE_PRESSURE: CommandDescriptor =
    CommandDescriptor::new("INTAKE_PRESSURE", ScalarWithUnit, "Intake manifold pressure");
pub static RPM: CommandDescriptor = CommandDescriptor::new("RPM", ScalarWithUnit, "Engine RPM");
pub static SPEED: CommandDescriptor =
    CommandDescriptor::new("SPEED", ScalarWithUnit, "Vehicle speed");
pub static TIMING_ADVANCE: CommandDescriptor =
    CommandDescriptor::new("TIMING_ADVANCE", ScalarWithUnit, "Timing advance");
pub static INTAKE_TEMP: CommandDescriptor =
    CommandDescriptor::new("INTAKE_TEMP", ScalarWithUnit, "Intake air temperature");
pub static MAF: CommandDescriptor =
    CommandDescriptor::new("MAF", ScalarWithUnit, "Mass air flow rate");
pub static THROTTLE_POS: CommandDescriptor =
    CommandDescriptor::new("THROTTLE_POS", ScalarWithUnit, "Throttle position");
pub static RUN_TIME: CommandDescriptor =
    CommandDescriptor::new("RUN_TIME", ScalarWithUnit, "Engine run time");
pub static FUEL_LEVEL: CommandDescriptor =
    CommandDescriptor::new("FUEL_LEVEL", ScalarWithUnit, "Fuel level input");
pub static DISTANCE_W_MIL: CommandDescriptor =
    CommandDescriptor::new("DISTANCE_W_MIL", ScalarWithUnit, "Distance traveled with MIL on");
pub static BAROMETRIC_PRESSURE: CommandDescriptor =
    CommandDescriptor::new("BAROMETRIC_PRESSURE", ScalarWithUnit, "Barometric pressure");
pub static CATALYST_TEMP_B1S1: CommandDescriptor = CommandDescriptor::new(
    "CATALYST_TEMP_B1S1",
    ScalarWithUnit,
    "Catalyst temperature - bank 1, sensor 1",
);
pub static CONTROL_MODULE_VOLTAGE: CommandDescriptor =
    CommandDescriptor::new("CONTROL_MODULE_VOLTAGE", ScalarWithUnit, "Control module voltage");
pub static FUEL_TYPE: CommandDescriptor = CommandDescriptor::new("FUEL_TYPE", Text, "Fuel type");
pub static HYBRID_BATTERY_REMAINING: CommandDescriptor = CommandDescriptor::new(
    "HYBRID_BATTERY_REMAINING",
    ScalarWithUnit,
    "Hybrid battery pack remaining life",
);
pub static OIL_TEMP: CommandDescriptor =
    CommandDescriptor::new("OIL_TEMP", ScalarWithUnit, "Engine oil temperature");
pub static VIN: CommandDescriptor =
    CommandDescriptor::new("VIN", Text, "Vehicle identification number");
pub static GET_DTC: CommandDescriptor =
    CommandDescriptor::new("GET_DTC", CodeList, "Stored diagnostic trouble codes");

/// Clears stored DTCs and the MIL. Never probed during capability discovery.
pub static CLEAR_DTC: CommandDescriptor =
    CommandDescriptor::new("CLEAR_DTC", CodeList, "Clear DTCs and freeze frame data");

/// Candidate commands probed during capability discovery, in probe order
pub static CANDIDATES: [&CommandDescriptor; 24] = [
    &STATUS,
    &FUEL_STATUS,
    &ENGINE_LOAD,
    &COOLANT_TEMP,
    &SHORT_FUEL_TRIM_1,
    &LONG_FUEL_TRIM_1,
    &INTAKE_PRESSURE,
    &RPM,
    &SPEED,
    &TIMING_ADVANCE,
    &INTAKE_TEMP,
    &MAF,
    &THROTTLE_POS,
    &RUN_TIME,
    &FUEL_LEVEL,
    &DISTANCE_W_MIL,
    &BAROMETRIC_PRESSURE,
    &CATALYST_TEMP_B1S1,
    &CONTROL_MODULE_VOLTAGE,
    &FUEL_TYPE,
    &HYBRID_BATTERY_REMAINING,
    &OIL_TEMP,
    &VIN,
    &GET_DTC,
];

/// Look up a candidate by name (case-insensitive)
pub fn candidate(name: &str) -> Option<&'static CommandDescriptor> {
    CANDIDATES
        .iter()
        .copied()
        .find(|c| c.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_candidate_names_unique() {
        let names: HashSet<_> = CANDIDATES.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), CANDIDATES.len());
    }

    #[test]
    fn test_attribute_keys_unique() {
        let keys: HashSet<_> = CANDIDATES.iter().map(|c| c.attribute_key()).collect();
        assert_eq!(keys.len(), CANDIDATES.len());
    }

    #[test]
    fn test_attribute_key() {
        assert_eq!(COOLANT_TEMP.attribute_key(), "vehicle.coolant_temp");
        assert_eq!(VIN.attribute_key(), "vehicle.vin");
    }

    #[test]
    fn test_candidate_lookup() {
        assert_eq!(candidate("rpm"), Some(&RPM));
        assert_eq!(candidate("GET_DTC"), Some(&GET_DTC));
        assert_eq!(candidate("CLEAR_DTC"), None);
        assert_eq!(candidate("NOPE"), None);
    }

    #[test]
    fn test_code_list_is_not_telemetry() {
        assert!(!GET_DTC.is_telemetry());
        assert!(RPM.is_telemetry());
        assert!(STATUS.is_telemetry());
    }
}
