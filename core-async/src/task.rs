//! Task spawning and cooperative scheduling.
//!
//! - `spawn`: Returns a `JoinHandle<T>` that can be awaited
//! - `spawn_blocking`: For CPU-intensive operations, uses the blocking pool
//! - `CooperativeYield`: Yields to the executor at a bounded interval inside
//!   long synchronous loops
//!
//! # Examples
//!
//! ```rust
//! use core_async::task::{self, CooperativeYield};
//! use core_async::time::Duration;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     assert_eq!(handle.await.unwrap(), 42);
//!
//!     let mut yielder = CooperativeYield::new(Duration::from_millis(120));
//!     for _ in 0..10_000 {
//!         yielder.maybe_yield().await;
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the Tokio runtime.
///
/// The spawned task may run on a different thread.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;

/// Yields control back to the executor once `interval` has elapsed since the
/// previous yield.
///
/// Ingestion loops call [`maybe_yield`](Self::maybe_yield) once per unit of
/// work; the call is a cheap clock read until the interval expires.
#[derive(Debug)]
pub struct CooperativeYield {
    interval: Duration,
    last_yield: Instant,
    yields: u64,
}

impl CooperativeYield {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_yield: Instant::now(),
            yields: 0,
        }
    }

    /// Yield if the interval has elapsed. Returns whether a yield happened.
    pub async fn maybe_yield(&mut self) -> bool {
        if self.last_yield.elapsed() < self.interval {
            return false;
        }
        yield_now().await;
        self.last_yield = Instant::now();
        self.yields += 1;
        true
    }

    /// Number of yields performed so far.
    pub fn yields(&self) -> u64 {
        self.yields
    }
}
