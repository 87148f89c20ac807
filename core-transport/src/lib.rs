//! # Vehicle Service Transport
//!
//! Typed, rate-limited access to the remote vehicle service.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RecordSource`]: the remote operations sync strategies are written against
//! - [`HttpRecordSource`]: the HTTP implementation over a host [`HttpClient`] bridge
//! - [`RateLimiter`]: token bucket with an adaptive requests-per-minute ceiling
//! - [`RetryPolicy`] / [`TimeoutPolicy`]: backoff with jitter and page-scaled deadlines
//! - [`CredentialProvider`]: bearer token lookup from the secure store
//!
//! Every request takes a limiter token, carries the bearer token and a
//! deadline, and is retried on timeouts, 429s, 5xx and unreachable hosts.
//! Authorization failures are never retried.
//!
//! [`HttpClient`]: bridge_traits::http::HttpClient

pub mod credential;
pub mod error;
pub mod limiter;
pub mod policy;
pub mod source;
pub mod types;

pub use credential::{CredentialProvider, SecureStoreCredentials, BEARER_TOKEN_KEY};
pub use error::{Result, TransportError};
pub use limiter::RateLimiter;
pub use policy::{execute_with_policy, RetryPolicy, TimeoutPolicy};
pub use source::{HttpRecordSource, PageQuery, RecordSource};
pub use types::{CollectionStats, FileListing, IdPage, RemoteFile, RemoteVehicle, ShapedPage};
