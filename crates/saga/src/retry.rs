//! Exponential backoff retry for transient failures.
//!
//! Only errors the caller classifies as retryable are retried; everything else
//! propagates on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::SagaError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_delay: Duration,
    /// Growth factor applied to the wait after each failure.
    pub multiplier: f64,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` total attempts and the default
    /// backoff shape.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    /// Wait after the `failures`-th failure (0-based):
    /// `initial_delay * multiplier^failures`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(failures as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Returns true if another attempt is allowed after `attempts` tries.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Runs `operation` under `policy`.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once attempts are exhausted.
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&SagaError) -> bool,
    mut operation: F,
) -> Result<T, SagaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SagaError>>,
{
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        metrics::counter!("retry_attempts_total", "operation" => operation_name.to_string())
            .increment(1);

        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempts,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if !is_retryable(&err) => {
                tracing::warn!(
                    operation = operation_name,
                    error = %err,
                    "operation failed with non-retryable error"
                );
                return Err(err);
            }
            Err(err) if !policy.should_retry(attempts) => {
                tracing::warn!(
                    operation = operation_name,
                    attempts,
                    error = %err,
                    "retry attempts exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for_attempt(attempts - 1);
                tracing::warn!(
                    operation = operation_name,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
