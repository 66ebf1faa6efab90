//! Bounded retry for persistence calls.

use std::time::Duration;

use super::StoreError;
use crate::config::PersistenceConfig;

/// Retries transient store failures a fixed number of times with doubling
/// backoff. Non-transient errors are returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PersistenceConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(
            config.max_write_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based).
    fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << (retry - 1).min(16))
    }

    /// Runs `op` until it succeeds, fails permanently, or runs out of
    /// attempts. `what` names the operation in logs.
    pub async fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        operation = what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store write failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(
                            operation = what,
                            attempts = attempt,
                            error = %e,
                            "store write failed; giving up"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
