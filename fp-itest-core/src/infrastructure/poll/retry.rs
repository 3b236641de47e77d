use super::{poll_until, PollPolicy};
use crate::foundation::ItestError;
use log::debug;
use std::future::Future;

/// Builds something that may transiently fail to construct (e.g. a client racing a node that has
/// not opened its listener yet), retrying within `policy`.
///
/// Exhausting the budget yields `ConstructionFailed` carrying the last construction error.
pub async fn construct_with_retry<F, Fut, T>(component: &str, policy: PollPolicy, mut op: F) -> Result<T, ItestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ItestError>>,
{
    let description = format!("construct {component}");
    let result = poll_until(&description, policy, || {
        let fut = op();
        async move {
            match fut.await {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    debug!("construction attempt failed component={} error={}", component, err);
                    Err(err)
                }
            }
        }
    })
    .await;

    result.map_err(|err| match err {
        ItestError::ConvergenceTimeout { waited_ms, last_error, .. } => ItestError::construction_failed(
            component,
            format!("gave up after {waited_ms}ms: {}", last_error.unwrap_or_else(|| "no attempt succeeded".to_string())),
        ),
        other => other,
    })
}
