//! Exponential backoff for idempotent provider calls.
//!
//! Only read-style calls go through here: ping, address resolution,
//! definition lookups and uncommitted quotes. Commits, voids and refunds are
//! sent exactly once.

use std::future::Future;
use std::time::Duration;

use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::with_max_attempts(1)
    }

    /// `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up. The last error is returned.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && attempt + 1 < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
