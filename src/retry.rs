//! Exponential-backoff retry policy.
//!
//! A [`RetryPolicy`] is plain data: how many attempts, the first delay, and
//! the cap. [`RetryPolicy::run`] drives any async operation under it.
//!
//! # Schedule
//!
//! With the indexing defaults (5 attempts, 5 s base, 60 s cap):
//!
//! | After failed attempt | Wait |
//! |----------------------|------|
//! | 1 | 5 s |
//! | 2 | 10 s |
//! | 3 | 20 s |
//! | 4 | 40 s |
//! | 5 | give up |
//!
//! Delays never decrease and never exceed the cap.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the `failed`-th failed attempt (1-based):
    /// `base * 2^(failed - 1)`, capped at `max_delay`.
    pub fn delay_before_retry(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds or attempts are exhausted, retrying on
    /// every error. Returns the last error on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, what: &str, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(what, op, |_| true).await
    }

    /// Like [`run`](Self::run), but stops immediately on errors for which
    /// `retryable` returns false. `op` receives the 1-based attempt number.
    pub async fn run_if<T, E, F, Fut, R>(&self, what: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    let delay = self.delay_before_retry(attempt);
                    tracing::warn!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
