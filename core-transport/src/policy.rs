//! # Request Policy
//!
//! Retry with exponential backoff and jitter, request deadlines scaled by
//! page size, and the loop that applies both around a single-attempt call.

use core_async::time::{sleep, Duration, Instant};
use core_runtime::config::{RetrySettings, TimeoutSettings};
use rand::Rng;
use std::future::Future;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::limiter::RateLimiter;

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay,
            max_delay: settings.max_delay,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based).
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`. Rate-limited attempts
    /// add up to 50% random jitter and wait at least the server's
    /// `Retry-After` hint.
    pub fn backoff(&self, attempt: u32, error: &TransportError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if !error.is_rate_limited() {
            return exponential;
        }

        let jitter_ceiling = exponential.as_millis() as u64 / 2;
        let jitter = if jitter_ceiling > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ceiling))
        } else {
            Duration::ZERO
        };

        let mut delay = exponential + jitter;
        if let Some(hint) = error.retry_after() {
            delay = delay.max(hint);
        }
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

// ============================================================================
// Deadlines
// ============================================================================

/// Deadline = `base + per_record * limit`, clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    settings: TimeoutSettings,
}

impl TimeoutPolicy {
    pub fn from_settings(settings: &TimeoutSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn for_limit(&self, limit: usize) -> Duration {
        let scaled = self
            .settings
            .base
            .saturating_add(
                self.settings
                    .per_record
                    .saturating_mul(u32::try_from(limit).unwrap_or(u32::MAX)),
            );
        scaled.clamp(self.settings.min, self.settings.max.max(self.settings.min))
    }

    /// Bulk dumps always get the largest deadline.
    pub fn bulk(&self) -> Duration {
        self.settings.max.max(self.settings.min)
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Run `call` under the limiter and retry policy.
///
/// Each attempt takes a limiter token first. Successes and 429s are fed back
/// to the limiter. Non-retryable errors return immediately; retryable ones
/// are retried until `max_attempts`, after which
/// [`TransportError::RetryExhausted`] carries the last cause.
pub async fn execute_with_policy<T, F, Fut>(
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    label: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        limiter.acquire().await;

        let started = Instant::now();
        match call().await {
            Ok(value) => {
                limiter.record_success(started.elapsed()).await;
                if attempt > 1 {
                    debug!(label, attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if error.is_rate_limited() {
                    limiter.record_rate_limited().await;
                }
                if !error.is_retryable() {
                    return Err(error);
                }
                if attempt >= policy.max_attempts {
                    warn!(label, attempts = attempt, error = %error, "Retries exhausted");
                    return Err(TransportError::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }

                let delay = policy.backoff(attempt, &error);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Request failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::config::LimiterSettings;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_limiter() -> RateLimiter {
        RateLimiter::new(&LimiterSettings {
            initial_rpm: 60_000,
            min_rpm: 10,
            max_rpm: 60_000,
            fast_response: Duration::from_secs(1),
        })
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        let err = TransportError::Timeout("t".into());

        assert_eq!(policy.backoff(1, &err), Duration::from_millis(100));
        assert_eq!(policy.backoff(3, &err), Duration::from_millis(400));
        assert_eq!(policy.backoff(10, &err), Duration::from_secs(1));
    }

    #[test]
    fn test_rate_limited_backoff_is_jittered_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        let err = TransportError::RateLimited { retry_after: None };

        for _ in 0..20 {
            let delay = policy.backoff(2, &err);
            assert!(delay >= Duration::from_millis(200) && delay <= Duration::from_millis(300));
        }
        assert_eq!(policy.backoff(10, &err), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_honours_retry_after() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(30),
        };
        let err = TransportError::RateLimited {
            retry_after: Some(Duration::from_secs(4)),
        };

        assert_eq!(policy.backoff(1, &err), Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_scales_with_limit() {
        let policy = TimeoutPolicy::from_settings(&TimeoutSettings {
            base: Duration::from_secs(10),
            per_record: Duration::from_millis(10),
            min: Duration::from_secs(5),
            max: Duration::from_secs(60),
        });

        assert_eq!(policy.for_limit(0), Duration::from_secs(10));
        assert_eq!(policy.for_limit(1000), Duration::from_secs(20));
        assert_eq!(policy.for_limit(100_000), Duration::from_secs(60));
        assert_eq!(policy.bulk(), Duration::from_secs(60));
    }

    #[core_async::test]
    async fn test_retries_until_success() {
        let limiter = fast_limiter();
        let calls = AtomicU32::new(0);

        let result = execute_with_policy(&limiter, &quick_policy(5), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TransportError::Server {
                    status: 502,
                    message: "bad gateway".into(),
                })
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[core_async::test]
    async fn test_non_retryable_returns_immediately() {
        let limiter = fast_limiter();
        let calls = AtomicU32::new(0);

        let result: Result<()> = execute_with_policy(&limiter, &quick_policy(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Unauthorized("expired".into()))
        })
        .await;

        assert!(matches!(result, Err(TransportError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[core_async::test]
    async fn test_exhaustion_wraps_last_error() {
        let limiter = fast_limiter();
        let calls = AtomicU32::new(0);

        let result: Result<()> = execute_with_policy(&limiter, &quick_policy(3), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Unreachable("refused".into()))
        })
        .await;

        match result {
            Err(TransportError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, TransportError::Unreachable(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[core_async::test]
    async fn test_rate_limit_lowers_limiter_ceiling() {
        let limiter = fast_limiter();
        let before = limiter.ceiling_rpm().await;

        let _: Result<()> = execute_with_policy(&limiter, &quick_policy(2), "test", || async {
            Err(TransportError::RateLimited { retry_after: None })
        })
        .await;

        assert!(limiter.ceiling_rpm().await < before);
    }
}
