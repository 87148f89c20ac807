//! Runtime abstraction layer for the FieldSync core.
//!
//! All `core-*` crates depend on this crate instead of depending on Tokio
//! directly, so the executor can be swapped for hosts that embed the core in
//! their own event loop.
//!
//! # Modules
//!
//! - `task`: Task spawning, cooperative yielding
//! - `time`: Sleep, timeouts, instants
//! - `sync`: Async-aware locks and channels
//! - `runtime`: Blocking entry points used by the attribute macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(5)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
