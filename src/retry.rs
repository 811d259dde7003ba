//! Bounded retry with exponential backoff.
//!
//! Only errors that classify themselves as transient are retried. With the
//! default 200 ms base and 3 attempts the wait sequence is 200 ms → 400 ms,
//! under a second of back-off per document.

use crate::error::EngineError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Minimum 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt` (1-based). Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }
}

/// Why a retried operation finally gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    /// Attempts actually made.
    pub attempts: u32,
    /// The last error seen.
    pub last_error: E,
    /// `true` when the last error was transient and the budget ran out;
    /// `false` when a non-transient error stopped retrying early.
    pub exhausted: bool,
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. `on_retry` is told about each
/// failure that will be retried, before the back-off sleep.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut on_retry: impl FnMut(u32, &E),
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                debug!("{}: non-transient failure, not retrying: {}", label, e);
                return Err(RetryError {
                    attempts: attempt,
                    last_error: e,
                    exhausted: false,
                });
            }
            Err(e) if attempt >= max_attempts => {
                warn!("{}: giving up after {} attempts: {}", label, attempt, e);
                return Err(RetryError {
                    attempts: attempt,
                    last_error: e,
                    exhausted: true,
                });
            }
            Err(e) => {
                let delay = policy.delay_before(attempt + 1);
                warn!(
                    "{}: attempt {}/{} failed: {}; retrying in {}ms",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                on_retry(attempt, &e);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn delays_double() {
        let p = RetryPolicy::new(4, Duration::from_millis(200));
        assert_eq!(p.delay_before(1), Duration::ZERO);
        assert_eq!(p.delay_before(2), Duration::from_millis(200));
        assert_eq!(p.delay_before(3), Duration::from_millis(400));
        assert_eq!(p.delay_before(4), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn absorbs_two_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();
        let out = retry_with_backoff(
            &fast(3),
            "test",
            |attempt, _e: &EngineError| retries.push(attempt),
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::Transient("crash".into()))
                    } else {
                        Ok("text")
                    }
                }
            },
        )
        .await;
        assert_eq!(out.unwrap(), "text");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = retry_with_backoff(
            &fast(3),
            "test",
            |_, _| {},
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(EngineError::Transient("timeout".into())) }
            },
        )
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert!(err.exhausted);
    }

    #[tokio::test]
    async fn non_transient_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = retry_with_backoff(
            &fast(3),
            "test",
            |_, _| {},
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(EngineError::InvalidInput("empty bitmap".into())) }
            },
        )
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!err.exhausted);
        assert_eq!(err.last_error, EngineError::InvalidInput("empty bitmap".into()));
    }
}
