//! Raw query responses as returned by a diagnostic link

use serde::{Deserialize, Serialize};

use super::DiagnosticTroubleCode;
use crate::commands::CommandDescriptor;
use crate::error::LinkError;

/// Decoded monitor status record (the STATUS command)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Malfunction indicator lamp is lit
    pub mil: bool,
    /// Number of DTCs currently stored
    pub dtc_count: u32,
    /// Ignition type reported by the ECU (e.g. "spark", "compression")
    pub ignition_type: String,
}

/// A value returned by the link for one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawValue {
    /// Physical quantity, optionally with a unit
    Quantity {
        magnitude: f64,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        unit: Option<String>,
    },
    /// ASCII text
    Text { value: String },
    /// Monitor status bitfield
    Status(StatusRecord),
    /// Trouble code list
    Codes { codes: Vec<DiagnosticTroubleCode> },
}

impl RawValue {
    /// Quantity without a unit
    pub fn number(magnitude: f64) -> Self {
        Self::Quantity {
            magnitude,
            unit: None,
        }
    }

    /// Quantity with a unit
    pub fn quantity(magnitude: f64, unit: impl Into<String>) -> Self {
        Self::Quantity {
            magnitude,
            unit: Some(unit.into()),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Code list from `(code, description)` pairs
    pub fn codes<I, C, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, D)>,
        C: Into<String>,
        D: Into<String>,
    {
        Self::Codes {
            codes: pairs
                .into_iter()
                .map(|(code, description)| DiagnosticTroubleCode::new(code, description))
                .collect(),
        }
    }

    /// Short name of the value's shape, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Quantity { .. } => "quantity",
            RawValue::Text { .. } => "text",
            RawValue::Status(_) => "status",
            RawValue::Codes { .. } => "codes",
        }
    }
}

/// Result of querying one command: the value or "no data"
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub command: &'static CommandDescriptor,
    pub value: Option<RawValue>,
}

impl QueryResponse {
    pub fn new(command: &'static CommandDescriptor, value: Option<RawValue>) -> Self {
        Self { command, value }
    }

    /// A "no data" response
    pub fn null(command: &'static CommandDescriptor) -> Self {
        Self::new(command, None)
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Tagged outcome of a single query.
///
/// Callers match on this instead of wrapping each query in its own
/// error handling: absence and failure are distinct, expected cases.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The link returned a value
    Value(RawValue),
    /// Command unsupported or no data at query time
    NoData,
    /// The link failed to answer
    Failed(LinkError),
}

impl QueryOutcome {
    /// Collapse into a [`QueryResponse`], dropping the failure reason.
    ///
    /// Returns the error separately so the caller can log it.
    pub fn into_response(
        self,
        command: &'static CommandDescriptor,
    ) -> (QueryResponse, Option<LinkError>) {
        match self {
            QueryOutcome::Value(value) => (QueryResponse::new(command, Some(value)), None),
            QueryOutcome::NoData => (QueryResponse::null(command), None),
            QueryOutcome::Failed(err) => (QueryResponse::null(command), Some(err)),
        }
    }
}

impl From<Result<Option<RawValue>, LinkError>> for QueryOutcome {
    fn from(result: Result<Option<RawValue>, LinkError>) -> Self {
        match result {
            Ok(Some(value)) => QueryOutcome::Value(value),
            Ok(None) => QueryOutcome::NoData,
            Err(err) => QueryOutcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::RPM;

    #[test]
    fn test_outcome_from_link_result() {
        assert_eq!(
            QueryOutcome::from(Ok(Some(RawValue::number(1.0)))),
            QueryOutcome::Value(RawValue::number(1.0))
        );
        assert_eq!(QueryOutcome::from(Ok(None)), QueryOutcome::NoData);
        assert_eq!(
            QueryOutcome::from(Err(LinkError::ConnectionClosed)),
            QueryOutcome::Failed(LinkError::ConnectionClosed)
        );
    }

    #[test]
    fn test_failed_outcome_becomes_null_response() {
        let (response, err) =
            QueryOutcome::Failed(LinkError::Timeout("5s".into())).into_response(&RPM);
        assert!(response.is_null());
        assert!(matches!(err, Some(LinkError::Timeout(_))));
    }

    #[test]
    fn test_raw_value_serializes_with_kind_tag() {
        let json = serde_json::to_value(RawValue::quantity(2500.0, "rpm")).unwrap();
        assert_eq!(json["kind"], "quantity");
        assert_eq!(json["unit"], "rpm");
    }
}
