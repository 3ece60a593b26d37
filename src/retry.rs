//! Backed-off retries for fallible platform calls.

use crate::error::{Error, Result};
use std::future::Future;
use tokio::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Run `op`, retrying on retryable failures (HTTP 429/5xx) with exponential
/// backoff: delay before retry `i` is `base_delay * 2^i`, no jitter. The last
/// error propagates unchanged once retries are exhausted; non-retryable
/// errors propagate immediately.
pub async fn with_retry<T, F, Fut>(mut op: F, policy: RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && err.is_retryable() => {
                let delay = policy.base_delay * 2u32.pow(attempt);
                warn!(attempt, ?delay, %err, "retryable failure; backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_retryable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let result = with_retry(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::api("API_ERROR", 503, "unavailable"))
                    } else {
                        Ok("done")
                    }
                }
            },
            policy(),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff delays: 1000ms then 2000ms.
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(started.elapsed() < Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<()> = with_retry(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::api("BAD_REQUEST", 400, "nope"))
                }
            },
            policy(),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Api {
                status_code: 400,
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<()> = with_retry(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::transport("connection reset"))
                }
            },
            policy(),
        )
        .await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<()> = with_retry(
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::api("RATE_LIMITED", 429, "slow down"))
                }
            },
            policy(),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Api {
                status_code: 429,
                ..
            })
        ));
        // Initial attempt plus three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
