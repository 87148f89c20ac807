//! `reqwest` adapter for [`HttpClient`].

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pooled, gzip-aware client. Every status code is handed back to the
/// transport as a response so that 429 and 5xx reach its retry policy.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// `timeout` applies to requests that carry no deadline of their own.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .gzip(true)
            .user_agent(concat!("fieldsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(Self::with_client)
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e)))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn prepare(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

fn map_transport_error(e: reqwest::Error) -> BridgeError {
    if e.is_timeout() {
        BridgeError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        BridgeError::Unreachable(e.to_string())
    } else {
        BridgeError::OperationFailed(e.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method;
        debug!(?method, url = %request.url, "HTTP request");

        let response = self.prepare(request).send().await.map_err(|e| {
            warn!(error = %e, "HTTP request failed before a response");
            map_transport_error(e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();

        // Large bulk dumps can still time out while the body streams in.
        let body = response.bytes().await.map_err(map_transport_error)?;
        debug!(status, bytes = body.len(), "HTTP response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_carries_method_headers_and_deadline() {
        let client = ReqwestHttpClient::new().unwrap();
        let request = HttpRequest::new(HttpMethod::Post, "https://api.example.com/vehicles/by-ids")
            .bearer_token("abc")
            .json_body(bytes_of(r#"{"ids":[]}"#))
            .timeout(Duration::from_secs(5));

        let built = client.prepare(request).build().unwrap();
        assert_eq!(built.method(), reqwest::Method::POST);
        assert_eq!(built.headers()["authorization"], "Bearer abc");
        assert_eq!(built.headers()["content-type"], "application/json");
        assert_eq!(built.timeout(), Some(&Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_transport_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_secs(2)).unwrap();
        let request = HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:9/vehicles/stats");

        match client.execute(request).await {
            Err(BridgeError::Unreachable(_)) | Err(BridgeError::Timeout(_)) => {}
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    fn bytes_of(text: &'static str) -> bytes::Bytes {
        bytes::Bytes::from_static(text.as_bytes())
    }
}
