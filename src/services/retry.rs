use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::Config;
use crate::error::Result;

/// Bounded retry with exponential backoff around remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Scale each sleep by a random factor in 75%..125%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.retry_base_delay_ms),
            max_backoff: Duration::from_millis(config.retry_max_delay_ms),
            multiplier: 2.0,
            jitter: config.retry_jitter,
        }
    }

    /// Same attempt budget with millisecond sleeps, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            multiplier: 1.0,
            jitter: false,
        }
    }

    fn next_backoff(&self, backoff: Duration) -> Duration {
        Duration::from_secs_f64(
            (backoff.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
        )
    }

    fn sleep_for(&self, backoff: Duration) -> Duration {
        if !self.jitter {
            return backoff;
        }
        let factor = rand::thread_rng().gen_range(0.75..1.25);
        Duration::from_secs_f64(backoff.as_secs_f64() * factor)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempt budget is spent. The last error is propagated.
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff.min(policy.max_backoff);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Non-retryable failure"
                );
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Giving up after final attempt"
                );
                return Err(e);
            }
            Err(e) => {
                let sleep = policy.sleep_for(backoff);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    backoff_ms = sleep.as_millis() as u64,
                    "Retrying after error"
                );
                tokio::time::sleep(sleep).await;
                backoff = policy.next_backoff(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn fail_then_succeed(failures: u32, calls: &AtomicU32) -> Result<&'static str> {
        retry(&RetryPolicy::immediate(5), "flaky", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(Error::upstream("completion", 503, "unavailable"))
            } else {
                Ok("done")
            }
        })
        .await
    }

    #[tokio::test]
    async fn succeeds_when_failures_fit_in_budget() {
        for failures in 0..5 {
            let calls = AtomicU32::new(0);
            let result = fail_then_succeed(failures, &calls).await;
            assert_eq!(result.unwrap(), "done");
            assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
        }
    }

    #[tokio::test]
    async fn propagates_after_exactly_five_attempts() {
        for failures in [5, 6, 50] {
            let calls = AtomicU32::new(0);
            let err = fail_then_succeed(failures, &calls).await.unwrap_err();
            assert!(matches!(err, Error::Upstream { status: 503, .. }));
            assert_eq!(calls.load(Ordering::SeqCst), 5);
        }
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry(&RetryPolicy::immediate(5), "auth", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::upstream("completion", 401, "invalid api key"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_responses_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(&RetryPolicy::immediate(3), "decode", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::malformed("not json"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        let mut backoff = policy.initial_backoff;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(backoff.as_secs());
            backoff = policy.next_backoff(backoff);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let ms = policy.sleep_for(Duration::from_millis(1_000)).as_millis();
            assert!((750..=1_250).contains(&ms), "{} out of range", ms);
        }
    }
}
