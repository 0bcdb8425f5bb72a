//! Bounded retry for outbound venue calls
//!
//! Every external read gets a fixed number of attempts with a fixed pause in
//! between. Once the attempts are exhausted the call counts as failed for the
//! current cycle; the next scheduled run starts from scratch.

use crate::config::RetryConfig;
use crate::telemetry::{increment_counter, CounterMetric};
use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy, clamping the attempt count to at least one
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no pause
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `operation` until it succeeds or the attempts are used up
    pub async fn run<T, Fut, F>(&self, op_name: &str, mut operation: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(op = op_name, attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(err) if attempt >= self.max_attempts => {
                    tracing::warn!(
                        op = op_name,
                        attempts = attempt,
                        error = %err,
                        "Giving up after retries"
                    );
                    return Err(err);
                }
                Err(err) => {
                    tracing::debug!(
                        op = op_name,
                        attempt,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    increment_counter(CounterMetric::RetryAttempts, 1);

                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}
