//! The retrying activity executor.

use std::future::Future;
use tracing::{debug, warn};

use super::{ActivityError, ActivityFailed, ActivityOp};
use crate::retry::RetryPolicy;

/// Executes activity closures under a [`RetryPolicy`]: per-attempt
/// timeout, exponential backoff between retryable failures, typed
/// exhaustion error.
///
/// The closure is invoked fresh for every attempt, so activities must be
/// idempotent or safely retryable — persistence activities achieve that
/// through externally supplied identifiers (see the store contract).
#[derive(Clone, Debug)]
pub struct ActivityExecutor {
    policy: RetryPolicy,
}

impl ActivityExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it succeeds, its cause is non-retryable, or the
    /// attempt budget is spent.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: ActivityOp,
        attempt: F,
    ) -> Result<T, ActivityFailed>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut schedule = self.policy.schedule();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let outcome =
                match tokio::time::timeout(self.policy.start_to_close_timeout, attempt()).await {
                    Ok(result) => result,
                    Err(_) => Err(ActivityError::TimedOut {
                        timeout: self.policy.start_to_close_timeout,
                    }),
                };

            match outcome {
                Ok(value) => {
                    debug!(%operation, attempts, "activity succeeded");
                    return Ok(value);
                }
                Err(cause) if cause.is_retryable() && attempts < self.policy.maximum_attempts => {
                    let delay = schedule.next_delay();
                    warn!(
                        %operation,
                        attempt = attempts,
                        max_attempts = self.policy.maximum_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %cause,
                        "activity attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(cause) => {
                    warn!(%operation, attempts, error = %cause, "activity failed");
                    return Err(ActivityFailed {
                        operation,
                        attempts,
                        cause,
                    });
                }
            }
        }
    }
}
