//! # Adaptive Rate Limiter
//!
//! Token bucket whose refill rate is the current requests-per-minute ceiling.
//! The ceiling adapts to server feedback:
//!
//! - a success faster than `fast_response` raises it by 5%
//! - a 429 lowers it by 15%
//!
//! and stays within `[min_rpm, max_rpm]`. The bucket holds at most one
//! second worth of tokens, so bursts never exceed the per-second share of the
//! ceiling.

use core_async::sync::Mutex;
use core_async::time::{sleep, Duration, Instant};
use core_runtime::config::LimiterSettings;
use tracing::debug;

const INCREASE_FACTOR: f64 = 1.05;
const DECREASE_FACTOR: f64 = 0.85;

#[derive(Debug)]
struct Bucket {
    ceiling_rpm: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn capacity(&self) -> f64 {
        (self.ceiling_rpm / 60.0).max(1.0)
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.ceiling_rpm / 60.0).min(self.capacity());
        self.last_refill = now;
    }
}

/// Shared by every request issued against one service.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    min_rpm: f64,
    max_rpm: f64,
    fast_response: Duration,
}

impl RateLimiter {
    pub fn new(settings: &LimiterSettings) -> Self {
        let min_rpm = f64::from(settings.min_rpm.max(1));
        let max_rpm = f64::from(settings.max_rpm).max(min_rpm);
        let ceiling_rpm = f64::from(settings.initial_rpm).clamp(min_rpm, max_rpm);

        let bucket = Bucket {
            ceiling_rpm,
            tokens: (ceiling_rpm / 60.0).max(1.0),
            last_refill: Instant::now(),
        };

        Self {
            bucket: Mutex::new(bucket),
            min_rpm,
            max_rpm,
            fast_response: settings.fast_response,
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                let per_second = bucket.ceiling_rpm / 60.0;
                Duration::from_secs_f64((1.0 - bucket.tokens) / per_second)
            };
            sleep(wait).await;
        }
    }

    /// Feed back a successful response and its latency.
    pub async fn record_success(&self, latency: Duration) {
        if latency >= self.fast_response {
            return;
        }
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now());
        bucket.ceiling_rpm = (bucket.ceiling_rpm * INCREASE_FACTOR).min(self.max_rpm);
    }

    /// Feed back a 429.
    pub async fn record_rate_limited(&self) {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now());
        bucket.ceiling_rpm = (bucket.ceiling_rpm * DECREASE_FACTOR).max(self.min_rpm);
        bucket.tokens = bucket.tokens.min(bucket.capacity());
        debug!(ceiling_rpm = bucket.ceiling_rpm, "Rate limit ceiling lowered");
    }

    /// Current requests-per-minute ceiling.
    pub async fn ceiling_rpm(&self) -> f64 {
        self.bucket.lock().await.ceiling_rpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(initial: u32, min: u32, max: u32) -> LimiterSettings {
        LimiterSettings {
            initial_rpm: initial,
            min_rpm: min,
            max_rpm: max,
            fast_response: Duration::from_millis(500),
        }
    }

    #[core_async::test]
    async fn test_fast_success_raises_ceiling() {
        let limiter = RateLimiter::new(&settings(100, 10, 1000));

        limiter.record_success(Duration::from_millis(20)).await;

        let ceiling = limiter.ceiling_rpm().await;
        assert!((ceiling - 105.0).abs() < 1e-9);
    }

    #[core_async::test]
    async fn test_slow_success_keeps_ceiling() {
        let limiter = RateLimiter::new(&settings(100, 10, 1000));

        limiter.record_success(Duration::from_secs(2)).await;

        assert!((limiter.ceiling_rpm().await - 100.0).abs() < 1e-9);
    }

    #[core_async::test]
    async fn test_rate_limited_lowers_ceiling_to_floor() {
        let limiter = RateLimiter::new(&settings(100, 80, 1000));

        limiter.record_rate_limited().await;
        assert!((limiter.ceiling_rpm().await - 85.0).abs() < 1e-9);

        limiter.record_rate_limited().await;
        assert!((limiter.ceiling_rpm().await - 80.0).abs() < 1e-9);
    }

    #[core_async::test]
    async fn test_ceiling_never_exceeds_max() {
        let limiter = RateLimiter::new(&settings(990, 10, 1000));

        for _ in 0..5 {
            limiter.record_success(Duration::from_millis(1)).await;
        }

        assert!((limiter.ceiling_rpm().await - 1000.0).abs() < 1e-9);
    }

    #[core_async::test]
    async fn test_initial_ceiling_is_clamped() {
        let limiter = RateLimiter::new(&settings(5, 10, 1000));
        assert!((limiter.ceiling_rpm().await - 10.0).abs() < 1e-9);
    }

    #[core_async::test]
    async fn test_burst_is_bounded_by_bucket() {
        // 600 rpm gives 10 tokens per second and a 10 token bucket.
        let limiter = RateLimiter::new(&settings(600, 10, 600));

        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(80));

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
