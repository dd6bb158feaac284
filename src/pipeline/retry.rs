//! Bounded exponential backoff for rate-limited model calls.
//!
//! Model APIs enforce per-minute quotas. Retrying a 429 immediately only
//! deepens the throttling, so the wait grows geometrically
//! (`2^attempt * base`) and carries random jitter so that separate runs do
//! not retry in lock-step. With the defaults (3 attempts, 2 s base, 1 s
//! jitter) the waits are 2–3 s then 4–5 s.
//!
//! Only errors that report [`RateLimitSignal::is_rate_limited`] are retried.
//! Anything else propagates on the first attempt, unchanged.

use crate::config::DraftConfig;
use crate::error::RateLimitSignal;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Retry ceiling and delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    pub base_ms: u64,
    /// Jitter is drawn from `[0, jitter_ms)`.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 2000,
            jitter_ms: 1000,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &DraftConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_ms: config.backoff_base_ms,
            jitter_ms: config.backoff_jitter_ms,
        }
    }

    /// Deterministic part of the wait after failed attempt `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_ms.saturating_mul(factor))
    }

    /// Full wait: base delay plus jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        } else {
            0
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-rate-limit error, or the
/// policy's attempts are used up.
///
/// On exhaustion the last observed error is returned. There is no
/// cancellation hook: dropping the returned future is the only way to
/// abandon a pending wait.
pub async fn with_backoff<T, E, F, Fut>(policy: &BackoffPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignal + Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() && attempt + 1 < attempts => {
                let wait = policy.delay(attempt);
                warn!(
                    "{}: rate limited ({}), retry {}/{} in {}ms",
                    label,
                    e,
                    attempt + 1,
                    attempts - 1,
                    wait.as_millis()
                );
                sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_rate_limited() {
                    warn!("{}: still rate limited after {} attempts", label, attempts);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn base_delay_doubles() {
        let p = BackoffPolicy::default();
        assert_eq!(p.base_delay(0), Duration::from_millis(2000));
        assert_eq!(p.base_delay(1), Duration::from_millis(4000));
        assert_eq!(p.base_delay(2), Duration::from_millis(8000));
    }

    #[test]
    fn jitter_stays_below_bound() {
        let p = BackoffPolicy::default();
        for _ in 0..200 {
            let d = p.delay(0);
            assert!(d >= Duration::from_millis(2000));
            assert!(d < Duration::from_millis(3000));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let p = BackoffPolicy {
            jitter_ms: 0,
            ..Default::default()
        };
        assert_eq!(p.delay(1), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_then_returns_success() {
        let policy = BackoffPolicy::default();
        let calls = AtomicU32::new(0);
        let stamps = Mutex::new(Vec::new());

        let result = with_backoff(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            stamps.lock().unwrap().push(Instant::now());
            async move {
                if n < 2 {
                    Err(ModelError::rate_limited("429"))
                } else {
                    Ok(format!("attempt {n}"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stamps = stamps.lock().unwrap();
        let first_wait = stamps[1] - stamps[0];
        let second_wait = stamps[2] - stamps[1];
        assert!(first_wait >= Duration::from_millis(2000), "{first_wait:?}");
        assert!(first_wait < Duration::from_millis(3000), "{first_wait:?}");
        assert!(second_wait >= Duration::from_millis(4000), "{second_wait:?}");
        assert!(second_wait < Duration::from_millis(5000), "{second_wait:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_error_is_not_retried() {
        let policy = BackoffPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), ModelError> = with_backoff(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ModelError::transport("502 bad gateway")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err(), ModelError::transport("502 bad gateway"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_error() {
        let policy = BackoffPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), ModelError> = with_backoff(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(ModelError::rate_limited(format!("quota #{n}"))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err(), ModelError::rate_limited("quota #2"));
        // Two waits only: no sleep after the final attempt.
        assert!(start.elapsed() < Duration::from_millis(2000 + 4000 + 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_waits() {
        let policy = BackoffPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        let start = Instant::now();
        let result: Result<(), ModelError> =
            with_backoff(&policy, "test", || async { Err(ModelError::rate_limited("429")) }).await;
        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
