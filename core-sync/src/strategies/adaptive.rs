//! AIMD tuning of chunk size and inter-chunk delay.

use core_async::time::Duration;
use core_runtime::config::SyncSettings;

const GROW: f64 = 1.25;
const SPEED_UP: f64 = 0.8;
const SHRINK_SLOW: f64 = 0.75;
const SHRINK_RATE_LIMITED: f64 = 0.5;
const SLOW_DOWN: f64 = 1.25;
const SLOW_DOWN_RATE_LIMITED: f64 = 1.5;

/// What the caller should do after a failed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Continue,
    /// Sleep this long before the next chunk
    Pause(Duration),
    /// Give up on the current collection
    Abort,
}

#[derive(Debug, Clone)]
pub struct AdaptiveChunker {
    size: usize,
    delay: Duration,
    min_size: usize,
    max_size: usize,
    min_delay: Duration,
    max_delay: Duration,
    slow_response: Duration,
    emergency_threshold: u32,
    abort_threshold: u32,
    emergency_pause: Duration,
    consecutive_failures: u32,
}

impl AdaptiveChunker {
    pub fn new(settings: &SyncSettings) -> Self {
        let mut chunker = Self {
            size: settings.initial_chunk_size,
            delay: settings.initial_chunk_delay,
            min_size: settings.min_chunk_size.max(1),
            max_size: settings.max_chunk_size.max(settings.min_chunk_size.max(1)),
            min_delay: settings.min_chunk_delay,
            max_delay: settings.max_chunk_delay.max(settings.min_chunk_delay),
            slow_response: settings.slow_response,
            emergency_threshold: settings.emergency_threshold,
            abort_threshold: settings.abort_threshold,
            emergency_pause: settings.emergency_pause,
            consecutive_failures: 0,
        };
        chunker.clamp();
        chunker
    }

    pub fn chunk_size(&self) -> usize {
        self.size
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Start a new collection with a clean failure streak.
    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.consecutive_failures = 0;
        if latency >= self.slow_response {
            self.scale(SHRINK_SLOW, SLOW_DOWN);
        } else {
            self.scale(GROW, SPEED_UP);
        }
    }

    pub fn record_failure(&mut self, rate_limited: bool) -> FailureAction {
        self.consecutive_failures += 1;
        if rate_limited {
            self.scale(SHRINK_RATE_LIMITED, SLOW_DOWN_RATE_LIMITED);
        } else {
            self.scale(SHRINK_SLOW, SLOW_DOWN);
        }

        let failures = self.consecutive_failures;
        if failures >= self.abort_threshold {
            FailureAction::Abort
        } else if failures >= self.emergency_threshold {
            let streak = failures - self.emergency_threshold + 1;
            FailureAction::Pause(self.emergency_pause.saturating_mul(streak))
        } else {
            FailureAction::Continue
        }
    }

    fn scale(&mut self, size_factor: f64, delay_factor: f64) {
        self.size = (self.size as f64 * size_factor).round() as usize;
        self.delay = self.delay.mul_f64(delay_factor);
        // A zero delay never grows multiplicatively.
        if delay_factor > 1.0 && self.delay.is_zero() {
            self.delay = self.min_delay;
        }
        self.clamp();
    }

    fn clamp(&mut self) {
        self.size = self.size.clamp(self.min_size, self.max_size);
        self.delay = self.delay.clamp(self.min_delay, self.max_delay);
    }
}
