//! Uniform call contract for every analysis stage: per-attempt timeout,
//! output shape validation and a bounded exponential-backoff retry.
//!
//! The invoker never raises. Exhausted or permanent failures come back as a
//! `StageFailure` and the caller decides whether that is candidate-fatal or
//! request-fatal.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{StageError, StageKind, ValidateOutput};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows `failed_attempts` failures:
    /// base, 2×base, 4×base, … capped at `max_delay`.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Terminal failure of one stage call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: StageKind,
    pub reason: String,
    pub attempts: u32,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.stage, self.attempts, self.reason
        )
    }
}

/// Accepted stage output plus the number of attempts it took.
#[derive(Debug, Clone)]
pub struct Invoked<T> {
    pub output: T,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct StageInvoker {
    policy: RetryPolicy,
    timeout: Duration,
}

impl StageInvoker {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    /// Runs `call` until it yields a valid output, a permanent error, or the
    /// attempt budget is spent.
    pub async fn invoke<T, F, Fut>(
        &self,
        stage: StageKind,
        mut call: F,
    ) -> Result<Invoked<T>, StageFailure>
    where
        T: ValidateOutput,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(output)) => match output.validate() {
                    Ok(()) => Ok(output),
                    Err(reason) => Err(StageError::InvalidOutput(reason)),
                },
                Ok(Err(e)) => Err(e),
                Err(_) => Err(StageError::Timeout(self.timeout)),
            };

            let error = match result {
                Ok(output) => {
                    return Ok(Invoked {
                        output,
                        attempts: attempt,
                    })
                }
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= max_attempts {
                warn!(stage = %stage, "Stage call gave up after {attempt} attempt(s): {error}");
                return Err(StageFailure {
                    stage,
                    reason: error.to_string(),
                    attempts: attempt,
                });
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                stage = %stage,
                "Stage attempt {}/{} failed ({error}), retrying after {}ms...",
                attempt,
                max_attempts,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
