//! Time-related abstractions.
//!
//! Re-exports `tokio::time` together with the standard library time types so
//! callers get a monotonic `Instant`, timer-wheel backed `sleep`, and
//! `timeout` from a single module.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(10)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(10));
//! }
//! ```

pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in milliseconds.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
