//! Single-command query execution

use std::time::Duration;

use obdwatch_core::{CommandDescriptor, DiagnosticLink, LinkError, QueryOutcome};
use tracing::debug;

/// Query `command`, bounded by `timeout`.
///
/// Never fails: link errors and timeouts become [`QueryOutcome::Failed`],
/// absence becomes [`QueryOutcome::NoData`].
pub async fn run_query(
    link: &dyn DiagnosticLink,
    command: &'static CommandDescriptor,
    timeout: Duration,
) -> QueryOutcome {
    let outcome = match tokio::time::timeout(timeout, link.query(command)).await {
        Ok(result) => QueryOutcome::from(result),
        Err(_) => QueryOutcome::Failed(LinkError::Timeout(format!(
            "{} did not answer within {}ms",
            command.name,
            timeout.as_millis()
        ))),
    };

    if matches!(outcome, QueryOutcome::NoData) {
        debug!(command = command.name, "No data");
    }
    outcome
}
