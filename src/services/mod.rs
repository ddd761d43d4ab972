//! Orchestration services for the payment pipeline.

pub mod correlator;
pub mod initiator;
pub mod status;

#[cfg(test)]
mod testkit;

#[cfg(test)]
mod initiator_tests;


use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Run a side effect that must never fail the surrounding operation.
/// Failures are logged and swallowed; the caller gets `None`.
pub(crate) async fn non_critical<T, E>(
    step: &'static str,
    fut: impl Future<Output = Result<T, E>>,
) -> Option<T>
where
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(step = step, error = %err, "non-critical step failed");
            None
        }
    }
}
