//! Bounded retry with exponential backoff.
//!
//! The schedule is fixed: the wait before retry `n` (1-based) is
//! `min(base_delay * 2^(n-1), max_delay)`. The defaults (3 attempts) wait
//! 1s, then 2s.
//! Waits are plain sleeps; nothing cancels them.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1,
            max_delay_secs: 30,
        }
    }
}

impl RetryPolicy {
    /// Wait before the given retry (1-based: retry 1 follows the first failure).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let secs = self
            .base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs);
        Duration::from_secs(secs)
    }
}

/// Outcome of an exhausted or aborted retry loop.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
    /// False when the classifier stopped the loop early.
    pub exhausted: bool,
}

/// Run `operation` until it succeeds, the classifier aborts, or the
/// attempt budget is spent.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    classifier: C,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };

        if classifier(&err) == RetryAction::Abort {
            return Err(RetryFailure {
                error: err,
                attempts: attempt,
                exhausted: false,
            });
        }

        if attempt >= total_attempts {
            return Err(RetryFailure {
                error: err,
                attempts: attempt,
                exhausted: true,
            });
        }

        let delay = policy.delay_before_retry(attempt);
        warn!(
            "Retryable error (attempt {}/{}), retrying in {}s: {}",
            attempt,
            total_attempts,
            delay.as_secs(),
            err
        );
        tokio::time::sleep(delay).await;
    }
}
