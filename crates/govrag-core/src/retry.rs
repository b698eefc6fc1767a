//! Bounded retry with exponential backoff for network calls.
//!
//! Only failures the caller classifies as transient are retried; everything
//! else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run a blocking operation, sleeping the thread between attempts.
    pub fn run_blocking<T, E, F, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_transient(&e) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {}ms",
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Async variant of [`RetryPolicy::run_blocking`] using the tokio timer.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_transient(&e) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {}ms",
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
