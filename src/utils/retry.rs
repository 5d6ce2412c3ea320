//! Retry utilities for resilient requests
//!
//! This module provides the per-request retry mechanism used by the detail
//! fetcher. Delays grow linearly with the attempt number, and the number of
//! attempts actually made is always returned alongside the result so callers
//! can report it.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts per request (first try included)
    pub max_attempts: u32,

    /// Base delay; the wait after attempt `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom attempts and base delay
    pub fn with_delay(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Result of a retried operation together with the attempts it took
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// Final result: the first success, or the last error
    pub result: Result<T, E>,

    /// Number of attempts made (1..=max_attempts)
    pub attempts: u32,
}

/// Execute an operation with linear backoff between attempts
///
/// The operation receives the 1-based attempt number. A zero attempt budget
/// is treated as one attempt. Errors for which `should_retry` returns false
/// end the sequence immediately.
///
/// # Example
///
/// ```no_run
/// use gather::utils::retry::{with_retry, RetryPolicy};
///
/// # async fn example() {
/// let policy = RetryPolicy::default();
/// let outcome = with_retry(
///     &policy,
///     |_attempt| async { Ok::<_, String>(42) },
///     |_err| true,
/// )
/// .await;
/// assert_eq!(outcome.attempts, 1);
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
) -> Attempted<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) => {
                if attempt >= max_attempts || !should_retry(&e) {
                    debug!(attempt, max_attempts, error = %e, "Giving up");
                    return Attempted {
                        result: Err(e),
                        attempts: attempt,
                    };
                }

                let delay = policy.delay_after(attempt);
                debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
