//! Telemetry normalization
//!
//! Converts a raw [`QueryResponse`] into flat `vehicle.*` attributes,
//! dispatching on the response shape declared by the command.
//! Key naming is fixed so the backend can aggregate attributes across
//! devices without a schema registry:
//!
//! | Shape            | Attributes                                              |
//! |------------------|---------------------------------------------------------|
//! | scalar-with-unit | `vehicle.<name>`, `vehicle.<name>.unit` (if present)    |
//! | string           | `vehicle.<name>`                                        |
//! | bitfield-status  | `vehicle.<name>.mil`, `.dtc_count`, `.ignition_type`    |
//! | code-list        | none (reported as individual faults)                    |

use crate::commands::ResponseShape;
use crate::error::NormalizeError;
use crate::models::{QueryResponse, RawValue, TelemetryAttribute};

/// Extract attributes from a response
///
/// A null response yields no attributes and is not an error.
pub fn extract(response: &QueryResponse) -> Result<Vec<TelemetryAttribute>, NormalizeError> {
    let Some(value) = &response.value else {
        return Ok(Vec::new());
    };

    let command = response.command;
    let key = command.attribute_key();

    match (command.shape, value) {
        (ResponseShape::ScalarWithUnit, RawValue::Quantity { magnitude, unit }) => {
            if !magnitude.is_finite() {
                return Err(NormalizeError::NonFinite {
                    command: command.name,
                });
            }
            let mut attrs = vec![TelemetryAttribute::new(key.clone(), *magnitude)];
            if let Some(unit) = unit.as_deref().filter(|u| !u.is_empty()) {
                attrs.push(TelemetryAttribute::new(format!("{}.unit", key), unit));
            }
            Ok(attrs)
        }
        (ResponseShape::String, RawValue::Text { value }) => {
            Ok(vec![TelemetryAttribute::new(key, value.as_str())])
        }
        (ResponseShape::BitfieldStatus, RawValue::Status(status)) => Ok(vec![
            TelemetryAttribute::new(format!("{}.mil", key), status.mil),
            TelemetryAttribute::new(format!("{}.dtc_count", key), status.dtc_count),
            TelemetryAttribute::new(
                format!("{}.ignition_type", key),
                status.ignition_type.as_str(),
            ),
        ]),
        (ResponseShape::CodeList, RawValue::Codes { .. }) => Ok(Vec::new()),
        (expected, found) => Err(NormalizeError::MalformedResponse {
            command: command.name,
            expected,
            found: found.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CANDIDATES, COOLANT_TEMP, FUEL_TYPE, GET_DTC, RPM, STATUS, VIN};
    use crate::models::{AttrValue, StatusRecord};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_null_response_emits_nothing_for_every_shape() {
        for command in CANDIDATES {
            let attrs = extract(&QueryResponse::null(command)).unwrap();
            assert!(attrs.is_empty(), "{} emitted {:?}", command.name, attrs);
        }
    }

    #[test]
    fn test_scalar_with_unit() {
        let response = QueryResponse::new(&RPM, Some(RawValue::quantity(2500.0, "rpm")));
        assert_eq!(
            extract(&response).unwrap(),
            vec![
                TelemetryAttribute::new("vehicle.rpm", 2500.0),
                TelemetryAttribute::new("vehicle.rpm.unit", "rpm"),
            ]
        );
    }

    #[test]
    fn test_scalar_without_unit() {
        let response = QueryResponse::new(&COOLANT_TEMP, Some(RawValue::number(88.0)));
        assert_eq!(
            extract(&response).unwrap(),
            vec![TelemetryAttribute::new("vehicle.coolant_temp", 88.0)]
        );
    }

    #[test]
    fn test_string() {
        let response = QueryResponse::new(&FUEL_TYPE, Some(RawValue::text("Gasoline")));
        assert_eq!(
            extract(&response).unwrap(),
            vec![TelemetryAttribute::new("vehicle.fuel_type", "Gasoline")]
        );
    }

    #[test]
    fn test_bitfield_status() {
        let status = StatusRecord {
            mil: true,
            dtc_count: 2,
            ignition_type: "spark".to_string(),
        };
        let response = QueryResponse::new(&STATUS, Some(RawValue::Status(status)));
        let attrs = extract(&response).unwrap();

        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].key, "vehicle.status.mil");
        assert_eq!(attrs[0].value, AttrValue::Bool(true));
        assert_eq!(attrs[1].value, AttrValue::Int(2));
        assert_eq!(attrs[2].value, AttrValue::Text("spark".into()));
    }

    #[test]
    fn test_code_list_emits_nothing() {
        let response = QueryResponse::new(
            &GET_DTC,
            Some(RawValue::codes([("P0171", "System Too Lean")])),
        );
        assert!(extract(&response).unwrap().is_empty());
    }

    #[test]
    fn test_vin_as_number_is_malformed() {
        let response = QueryResponse::new(&VIN, Some(RawValue::number(42.0)));
        assert_eq!(
            extract(&response),
            Err(NormalizeError::MalformedResponse {
                command: "VIN",
                expected: ResponseShape::String,
                found: "quantity",
            })
        );
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let response = QueryResponse::new(&RPM, Some(RawValue::number(f64::NAN)));
        assert!(matches!(
            extract(&response),
            Err(NormalizeError::NonFinite { command: "RPM" })
        ));
    }
}
