//! Retry with exponential backoff for transient failures.
//!
//! Failures classified as transient by [`ArchiveError::is_transient`] are
//! retried until the attempt budget runs out, then reported as
//! [`ArchiveError::RetryExhausted`]. Anything else fails fast, unchanged.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};

/// Default maximum attempts (including the first one).
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Default cap on the delay between retries.
const DEFAULT_MAX_DELAY_MS: u64 = 5000;

/// Each retry waits this many times longer than the previous one.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Retry `max_attempts` times without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: BACKOFF_MULTIPLIER,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay to wait after `delay`, capped at `max_delay`.
    ///
    /// A product that is not a valid duration falls back to `max_delay`.
    fn next_delay(&self, delay: Duration) -> Duration {
        let max_delay = self.max_delay();
        let next = delay.as_secs_f64() * self.backoff_multiplier;
        Duration::try_from_secs_f64(next)
            .map(|next| next.min(max_delay))
            .unwrap_or(max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// the attempt budget is spent.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay();

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = %operation_name,
                        attempts = attempt,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                debug!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "operation failed with non-retryable error"
                );
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    operation = %operation_name,
                    attempts = attempt,
                    error = %e,
                    "operation failed after max attempts"
                );
                return Err(ArchiveError::RetryExhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "operation failed, will retry"
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                delay = config.next_delay(delay);
            }
        }
    }
}
