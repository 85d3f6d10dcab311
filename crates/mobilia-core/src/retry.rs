//! Parameterized retry-with-backoff for external service calls.
//!
//! Every AI/recognition/embedding call site shares this one utility
//! instead of hand-rolling counter loops. Only [`Error::is_transient`]
//! failures are retried; anything else surfaces immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry policy for transient external-service errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Base delay; doubles after each failed attempt.
    pub base_delay: Duration,
    /// Whether to add up to one base-delay of random jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::defaults::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(crate::defaults::RETRY_BASE_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Set the maximum attempt count (clamped to at least 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the base backoff delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff delay before retrying after the given 0-based attempt.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        if self.jitter {
            let extra = rand::thread_rng().gen_range(0..=self.base_delay.as_millis() as u64);
            exp + Duration::from_millis(extra)
        } else {
            exp
        }
    }
}

/// Run `f` under `policy`, retrying transient errors with exponential
/// backoff. `op` names the operation for logging.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient error, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(op, attempts = policy.max_attempts, error = %e, "Retries exhausted");
                } else {
                    debug!(op, error = %e, "Non-transient error, not retrying");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_backoff(&fast_policy(3), "test", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_backoff(&fast_policy(3), "test", move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Transient("rate limited".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_transient_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32> = with_backoff(&fast_policy(3), "test", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transient("still rate limited".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32> = with_backoff(&fast_policy(5), "test", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::Validation("bad candidate".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policy_builder_clamps_attempts() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn delay_doubles_without_jitter() {
        let policy = fast_policy(5).with_base_delay(Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
