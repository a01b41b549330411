use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::workflow::error::{WorkflowError, cancelled, timed_out};

/// Races one external call against the request deadline and the caller's
/// cancellation token. The inner future is dropped on either outcome.
pub async fn guarded<F, T>(
    operation: &str,
    deadline: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, WorkflowError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(operation)),
        outcome = tokio::time::timeout(deadline, call) => {
            outcome.map_err(|_| timed_out(operation, deadline.as_millis()))
        }
    }
}
