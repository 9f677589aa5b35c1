//! Retry policy shared by the OCR and vision stages.
//!
//! Transient backend failures (429, 503, connection resets) are frequent
//! under concurrent load. Exponential backoff (`base_backoff_ms * 2^attempt`,
//! capped) avoids the thundering-herd problem where every worker retries at
//! the same instant against a recovering endpoint.

use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Bounded retry with exponential backoff.
///
/// With the defaults the wait sequence is 500 ms → 1 s → 2 s, totalling
/// under 4 s of backoff per page before the page is given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry attempts after the first failure. Default: 3.
    pub max_retries: u32,
    /// Initial delay in milliseconds. Default: 500.
    pub base_backoff_ms: u64,
    /// Ceiling on any single delay in milliseconds. Default: 8000.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based), doubling each time up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self
            .base_backoff_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Run `op` until it succeeds, the error stops being transient, or the
/// retry budget is spent. Returns the last error in the failure case.
///
/// `is_transient` decides whether an error is worth another attempt;
/// permanent errors (bad API key, malformed request) surface immediately.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt > policy.max_retries || !is_transient(&err) {
                    return Err(err);
                }
                let backoff = policy.backoff(attempt);
                warn!(
                    "{}: retry {}/{} after {:?} ({})",
                    label, attempt, policy.max_retries, backoff, err
                );
                sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2_000));
        // way past the cap
        assert_eq!(policy.backoff(10), Duration::from_millis(8_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(8_000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let calls = Cell::new(0u32);
        let result: Result<u32, String> =
            execute_with_retry(&policy, "test", |_| true, || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err("transient".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let policy = RetryPolicy::default();
        let calls = Cell::new(0u32);
        let result: Result<(), String> =
            execute_with_retry(&policy, "test", |_| false, || {
                calls.set(calls.get() + 1);
                async { Err("bad request".to_string()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_backoff_ms: 1,
            max_backoff_ms: 1,
        };
        let calls = Cell::new(0u32);
        let result: Result<(), String> =
            execute_with_retry(&policy, "test", |_| true, || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err(format!("fail {n}")) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "fail 3");
        assert_eq!(calls.get(), 3);
    }
}
