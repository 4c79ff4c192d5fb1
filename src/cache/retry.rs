//! Retry Policy
//!
//! Bounded exponential backoff around backend calls. Each attempt runs under
//! the operation timeout; a timeout counts as a transient failure. Only the
//! final failure reaches the caller, as `CacheError::BackendUnavailable`.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{error, warn};

use crate::backend::{BackendError, BackendResult};
use crate::error::{CacheError, Result};

/// Retry and timeout settings for backend calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: u32,
    /// Cap on any single delay
    pub max_delay_ms: u64,
    /// Per-attempt timeout. Zero disables it
    pub operation_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            multiplier: 2,
            max_delay_ms: 2_000,
            operation_timeout: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `retry`-th failure (0-based).
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(retry);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// `attempt` is invoked once per try and must build a fresh future each
    /// time.
    pub async fn run<T, F, Fut>(&self, backend: &'static str, op: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tries = 0u32;

        loop {
            tries += 1;
            let outcome = if self.operation_timeout.is_zero() {
                attempt().await
            } else {
                match timeout(self.operation_timeout, attempt()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(BackendError::Timeout(self.operation_timeout)),
                }
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_transient() && tries < max_attempts {
                let delay = self.calculate_backoff(tries - 1);
                warn!(
                    backend,
                    op,
                    attempt = tries,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Backend call failed, retrying"
                );
                sleep(delay).await;
                continue;
            }

            error!(backend, op, attempts = tries, error = %err, "Backend call failed, giving up");
            return Err(CacheError::BackendUnavailable {
                backend,
                attempts: tries,
                reason: err.to_string(),
            });
        }
    }
}
