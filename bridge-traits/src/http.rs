//! HTTP Client Abstraction
//!
//! Single-attempt async HTTP execution. Retry, backoff and rate limiting are
//! owned by the transport policy in `core-transport`, so adapters must not
//! retry on their own and must surface non-2xx statuses as responses rather
//! than errors.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

/// The record service only needs reads and the by-ids lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request deadline; adapters fall back to their own default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Attach an already encoded JSON document.
    pub fn json_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self.header("Content-Type", "application/json")
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Async HTTP client.
///
/// One attempt per call. Non-2xx responses come back as `Ok(HttpResponse)`;
/// only transport failures are errors: [`BridgeError::Timeout`] for missed
/// deadlines and [`BridgeError::Unreachable`] for DNS, connect or reset
/// failures.
///
/// [`BridgeError::Timeout`]: crate::error::BridgeError::Timeout
/// [`BridgeError::Unreachable`]: crate::error::BridgeError::Unreachable
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
///
/// async fn stats(client: &dyn HttpClient, token: &str) -> Result<u16> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://api.example.com/vehicles/stats")
///         .bearer_token(token);
///     Ok(client.execute(request).await?.status)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new(HttpMethod::Post, "https://api.example.com/vehicles/by-ids")
            .bearer_token("secret")
            .json_body(Bytes::from_static(br#"{"ids":["a"]}"#))
            .timeout(Duration::from_secs(30));

        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer secret")
        );
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some(br#"{"ids":["a"]}"#.as_slice()));
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_success_range() {
        assert!(response(200, &[]).is_success());
        assert!(response(204, &[]).is_success());
        assert!(!response(304, &[]).is_success());
        assert!(!response(429, &[]).is_success());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let limited = response(429, &[("retry-after", "3")]);

        assert_eq!(limited.header("Retry-After"), Some("3"));
        assert_eq!(limited.header("X-Missing"), None);
    }
}
