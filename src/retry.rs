//! Retry policy applied to every remote call
//!
//! Failures are classified through [`SyncError::failure_kind`]; only transient
//! ones (rate limiting, server-side 5xx, transport hiccups) are retried. Waits
//! grow exponentially from `initial_delay`, doubling each time and capped at
//! `max_delay`. The attempt cap is absolute: once `max_attempts` calls have
//! failed the last error is handed back to the caller.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{Result, SyncError};

/// Backoff parameters for remote operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call
    pub max_attempts: u32,
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Policy that calls the operation exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based): `initial * 2^(retry-1)`, capped
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self
            .initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    /// Every wait the policy would impose if all attempts failed transiently
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .map(|retry| self.delay_for_retry(retry))
            .collect()
    }

    /// Run `operation`, retrying transient failures
    pub async fn run<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with(operation_name, SyncError::is_transient, operation)
            .await
    }

    /// Run `operation`, retrying failures for which `should_retry` returns true
    pub async fn run_with<T, F, Fut, P>(
        &self,
        operation_name: &str,
        should_retry: P,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&SyncError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!("{} succeeded on attempt {}", operation_name, attempts);
                    }
                    return Ok(result);
                }
                Err(e) if should_retry(&e) && attempts < max_attempts => {
                    let delay = self.delay_for_retry(attempts);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if attempts > 1 {
                        warn!(
                            "{} giving up after {} attempts: {}",
                            operation_name, attempts, e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
