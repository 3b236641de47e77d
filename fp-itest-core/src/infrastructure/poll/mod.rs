//! Convergence polling: the single "wait until a distributed predicate holds" primitive.
//!
//! Every cross-process synchronization point (service readiness, actor registration, vote
//! counts, finalization) is an instantiation of [`poll_until`] with a [`PollPolicy`]. Predicate
//! errors are treated as "not yet", never as failure; only the deadline ends a wait.

mod retry;

pub use retry::construct_with_retry;

use crate::foundation::{
    ItestError, CLIENT_CONSTRUCTION_TIMEOUT, EVENTUALLY_POLL_INTERVAL, EVENTUALLY_WAIT_TIMEOUT, SERVICE_READY_TIMEOUT,
};
use log::{debug, trace};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

/// Minimum time granted to one evaluation, so the final check at the deadline still gets to run.
const MIN_EVALUATION_BUDGET: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Long budget for eventually-consistent chain properties.
    pub const fn convergence() -> Self {
        Self::new(EVENTUALLY_WAIT_TIMEOUT, EVENTUALLY_POLL_INTERVAL)
    }

    /// Short budget for client construction against a freshly spawned node.
    pub const fn construction() -> Self {
        Self::new(CLIENT_CONSTRUCTION_TIMEOUT, EVENTUALLY_POLL_INTERVAL)
    }

    pub const fn service_ready() -> Self {
        Self::new(SERVICE_READY_TIMEOUT, EVENTUALLY_POLL_INTERVAL)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::convergence()
    }
}

/// Repeatedly evaluates `predicate` until it yields a value or `policy.timeout` elapses.
///
/// The predicate is always evaluated at least once, and once more at the deadline: sleeps are
/// capped at the remaining budget. A value produced strictly before the deadline is therefore
/// never reported as a timeout. Each evaluation is itself bounded by the remaining budget, so a
/// predicate that hangs cannot stretch the wait past its deadline.
pub async fn poll_until<T, F, Fut>(description: &str, policy: PollPolicy, mut predicate: F) -> Result<T, ItestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ItestError>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut last_error: Option<String> = None;
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        let budget = deadline.saturating_duration_since(Instant::now()).max(MIN_EVALUATION_BUDGET);
        let outcome = match timeout(budget, predicate()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("convergence predicate stalled description={} attempt={} budget_ms={}", description, attempts, budget.as_millis());
                Err(ItestError::Message("predicate did not complete before deadline".to_string()))
            }
        };
        match outcome {
            Ok(Some(value)) => {
                debug!(
                    "convergence reached description={} attempts={} elapsed_ms={}",
                    description,
                    attempts,
                    started.elapsed().as_millis()
                );
                return Ok(value);
            }
            Ok(None) => {
                trace!("convergence pending description={} attempt={}", description, attempts);
            }
            Err(err) => {
                debug!("convergence predicate error description={} attempt={} error={}", description, attempts, err);
                last_error = Some(err.to_string());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ItestError::ConvergenceTimeout {
                description: description.to_string(),
                waited_ms: now.duration_since(started).as_millis(),
                last_error,
            });
        }
        sleep(policy.interval.min(deadline - now)).await;
    }
}

/// `bool` form of [`poll_until`].
pub async fn await_condition<F, Fut>(description: &str, policy: PollPolicy, mut predicate: F) -> Result<(), ItestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ItestError>>,
{
    poll_until(description, policy, || {
        let fut = predicate();
        async move { fut.await.map(|done| done.then_some(())) }
    })
    .await
}
