//! Cancellation helpers
//!
//! Every suspension point in the poll loop goes through one of these so a
//! shutdown request is observed without waiting for a timer or the link.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::PollError;

/// Await `future` unless `cancel` fires first
pub async fn guard<F>(cancel: &CancellationToken, future: F) -> Result<F::Output, PollError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        output = future => Ok(output),
    }
}

/// Sleep for `duration` unless `cancel` fires first
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<(), PollError> {
    guard(cancel, tokio::time::sleep(duration)).await
}
