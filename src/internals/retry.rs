//! Retry logic with exponential backoff for idempotent calls
//!
//! Only the OAuth refresh exchange goes through this executor. The proxied
//! message call is never retried: a partially processed request may already
//! have consumed quota on the upstream account.
//!
//! - Exponential backoff: 500ms, 1s, 2s, capped at 4s, plus up to 10% jitter
//! - Per-attempt timeout and a total operation budget
//! - Only errors reporting [`RelayError::is_retryable`] are retried

use crate::error::{RelayError, RelayResult};
use crate::logging::{log_debug, log_error};

use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Retry policy configuration for refresh exchanges
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum total operation time
    pub total_timeout: Duration,
    /// Timeout for an individual attempt
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            backoff_multiplier: 2.0,
            total_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Retry executor that handles exponential backoff
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    pub(crate) policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Execute an operation, retrying transient failures
    pub async fn execute<F, Fut, T>(&self, operation: F) -> RelayResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = RelayResult<T>>,
    {
        let start_time = Instant::now();
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.policy.max_attempts {
            if start_time.elapsed() >= self.policy.total_timeout {
                break;
            }
            attempt += 1;

            log_debug!(
                attempt = attempt,
                max_attempts = self.policy.max_attempts,
                "Executing request with retry logic"
            );

            let error = match tokio::time::timeout(self.policy.request_timeout, operation()).await
            {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_elapsed) => RelayError::upstream_transport(format!(
                    "attempt timed out after {}s",
                    self.policy.request_timeout.as_secs()
                )),
            };

            let retryable = error.is_retryable();
            last_error = Some(error);
            if !retryable || attempt >= self.policy.max_attempts {
                break;
            }

            let delay = self.calculate_delay(attempt);
            log_debug!(
                attempt = attempt,
                delay_ms = delay.as_millis(),
                error = ?last_error.as_ref(),
                "Request failed, retrying after delay"
            );
            sleep(delay).await;
        }

        let final_error = last_error.unwrap_or_else(|| {
            RelayError::upstream_transport("retry budget exhausted before first attempt")
        });

        log_error!(
            attempts = attempt,
            total_duration_ms = start_time.elapsed().as_millis(),
            error = %final_error,
            "Request failed after all retry attempts"
        );

        Err(final_error)
    }

    /// Calculate delay for exponential backoff
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_seconds =
            self.policy.initial_delay.as_secs_f64() * self.policy.backoff_multiplier.powi(exponent);

        let delay = delay_seconds.min(self.policy.max_delay.as_secs_f64());

        // Add jitter to prevent thundering herd
        let jitter = fastrand::f64() * 0.1;
        Duration::from_secs_f64(delay * (1.0 + jitter))
    }
}
