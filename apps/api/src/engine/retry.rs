//! Activity execution: per-attempt timeout plus capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Total attempts including the first. Never less than 1.
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(30),
            maximum_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = scaled.min(self.maximum_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    pub fn new(start_to_close_timeout: Duration, maximum_attempts: u32) -> Self {
        Self {
            start_to_close_timeout,
            retry_policy: RetryPolicy {
                maximum_attempts: maximum_attempts.max(1),
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ActivityError {
    #[error("{message}")]
    Failed { message: String, retryable: bool },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("activity '{name}' gave up after {attempts} attempts: {last}")]
    Exhausted {
        name: String,
        attempts: u32,
        last: String,
    },
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ActivityError::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        ActivityError::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            ActivityError::Failed { retryable, .. } => *retryable,
            ActivityError::Timeout(_) => true,
            ActivityError::Exhausted { .. } => false,
        }
    }
}

/// Runs `attempt_fn` until it succeeds, fails non-retryably, or the policy's
/// attempt budget runs out. Every attempt is bounded by the start-to-close timeout.
pub async fn run_with_retry<T, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    mut attempt_fn: F,
) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let max_attempts = options.retry_policy.maximum_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(options.start_to_close_timeout, attempt_fn()).await
        {
            Ok(result) => result,
            Err(_) => Err(ActivityError::Timeout(options.start_to_close_timeout)),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }

        if attempt >= max_attempts {
            return Err(ActivityError::Exhausted {
                name: name.to_string(),
                attempts: attempt,
                last: err.to_string(),
            });
        }

        let delay = options.retry_policy.delay_after(attempt);
        warn!(
            "Activity '{name}' attempt {attempt}/{max_attempts} failed: {err}; retrying in {}ms",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}
