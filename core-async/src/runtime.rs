//! Runtime utilities that abstract over the underlying async executor.
//!
//! We wrap Tokio's runtime primitives so that downstream crates never need to
//! depend on Tokio directly.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a multi-threaded runtime.
///
/// Sync sessions spawn helper tasks and hold async locks across awaits, so the
/// test and main macros use a small multi-threaded runtime rather than a
/// current-thread one.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}
