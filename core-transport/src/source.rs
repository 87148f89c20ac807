//! # Record Source
//!
//! [`RecordSource`] is the seam between sync strategies and the remote
//! service. [`HttpRecordSource`] implements it over a [`HttpClient`] bridge,
//! applying the shared rate limiter, retry policy and per-request deadlines to
//! every call.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use core_async::time::{self, Duration};
use core_runtime::config::SyncSettings;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::credential::CredentialProvider;
use crate::error::{Result, TransportError};
use crate::limiter::RateLimiter;
use crate::policy::{execute_with_policy, RetryPolicy, TimeoutPolicy};
use crate::types::{
    ByIdsBody, CollectionStats, DataEnvelope, FileListing, FileRecordsEnvelope, FilesEnvelope,
    IdPage, IdsEnvelope, ShapedPage, StatsEnvelope,
};

const ERROR_BODY_PREVIEW: usize = 200;

/// Offset-paged query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub collection: String,
    pub skip: u64,
    pub limit: usize,
    /// Only records modified strictly after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl PageQuery {
    pub fn new(collection: impl Into<String>, skip: u64, limit: usize) -> Self {
        Self {
            collection: collection.into(),
            skip,
            limit,
            since: None,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}

/// Remote operations the sync strategies are built on.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Per-collection record counts.
    async fn stats(&self) -> Result<Vec<CollectionStats>>;

    /// One offset page of a collection.
    async fn fetch_page(&self, query: &PageQuery) -> Result<ShapedPage>;

    /// The whole dataset, or one collection of it, in a single response.
    async fn fetch_bulk(&self, collection: Option<&str>) -> Result<ShapedPage>;

    /// One page of remote identifiers for a collection.
    async fn list_ids(&self, collection: &str, skip: u64, limit: usize) -> Result<IdPage>;

    /// Full records for the given identifiers.
    async fn fetch_by_ids(&self, collection: &str, ids: &[String]) -> Result<ShapedPage>;

    /// One page (1-based) of the upload file listing.
    async fn list_files(&self, page: u64, limit: usize) -> Result<FileListing>;

    /// One page (1-based) of the records belonging to an upload file.
    async fn fetch_file_page(&self, name: &str, page: u64, limit: usize) -> Result<ShapedPage>;
}

/// [`RecordSource`] over HTTP.
pub struct HttpRecordSource {
    base_url: String,
    http_client: Arc<dyn HttpClient>,
    credentials: Arc<dyn CredentialProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    timeouts: TimeoutPolicy,
}

impl HttpRecordSource {
    pub fn new(
        base_url: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        credentials: Arc<dyn CredentialProvider>,
        settings: &SyncSettings,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client,
            credentials,
            limiter: Arc::new(RateLimiter::new(&settings.limiter)),
            retry: RetryPolicy::from_settings(&settings.retry),
            timeouts: TimeoutPolicy::from_settings(&settings.timeouts),
        }
    }

    /// The limiter shared by every request from this source.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        timeout: Duration,
        label: &'static str,
    ) -> Result<T> {
        self.send_json(HttpMethod::Get, url, None, timeout, label)
            .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<Bytes>,
        timeout: Duration,
        label: &'static str,
    ) -> Result<T> {
        let response = execute_with_policy(&self.limiter, &self.retry, label, || {
            self.attempt(method, &url, body.clone(), timeout)
        })
        .await?;

        serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::Decode(format!("{}: {}", label, e)))
    }

    async fn attempt(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let token = self.credentials.bearer_token().await?;

        let mut request = HttpRequest::new(method, url)
            .bearer_token(token)
            .header("Accept", "application/json")
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json_body(body);
        }

        let response = match time::timeout(timeout, self.http_client.execute(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::Timeout(format!(
                    "no response within {} ms",
                    timeout.as_millis()
                )))
            }
        };

        if response.is_success() {
            return Ok(response);
        }
        Err(classify_failure(&response))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn classify_failure(response: &HttpResponse) -> TransportError {
    let retry_after = response
        .header("Retry-After")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let text = String::from_utf8_lossy(&response.body);
    let message: String = text.chars().take(ERROR_BODY_PREVIEW).collect();

    TransportError::from_status(response.status, message, retry_after)
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    #[instrument(skip(self))]
    async fn stats(&self) -> Result<Vec<CollectionStats>> {
        let envelope: StatsEnvelope = self
            .get_json(
                self.url("/vehicles/stats"),
                self.timeouts.for_limit(0),
                "stats",
            )
            .await?;
        Ok(envelope.collections)
    }

    #[instrument(skip(self, query), fields(collection = %query.collection, skip = query.skip, limit = query.limit))]
    async fn fetch_page(&self, query: &PageQuery) -> Result<ShapedPage> {
        let mut url = self.url(&format!(
            "/vehicles/data?collection={}&skip={}&limit={}",
            urlencoding::encode(&query.collection),
            query.skip,
            query.limit
        ));
        if let Some(since) = query.since {
            url.push_str("&since=");
            url.push_str(&urlencoding::encode(
                &since.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }

        let envelope: DataEnvelope = self
            .get_json(url, self.timeouts.for_limit(query.limit), "data page")
            .await?;

        let mut page = ShapedPage::from_values(envelope.data);
        page.total = envelope.pagination.and_then(|p| p.total);
        debug!(
            received = page.received(),
            rejected = page.rejected,
            "Fetched data page"
        );
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn fetch_bulk(&self, collection: Option<&str>) -> Result<ShapedPage> {
        let url = match collection {
            Some(name) => self.url(&format!(
                "/vehicles/bulk?collection={}",
                urlencoding::encode(name)
            )),
            None => self.url("/vehicles/bulk"),
        };

        let envelope: DataEnvelope = self.get_json(url, self.timeouts.bulk(), "bulk").await?;
        let mut page = ShapedPage::from_values(envelope.data);
        page.total = envelope.pagination.and_then(|p| p.total);
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn list_ids(&self, collection: &str, skip: u64, limit: usize) -> Result<IdPage> {
        let url = self.url(&format!(
            "/vehicles/ids?collection={}&skip={}&limit={}",
            urlencoding::encode(collection),
            skip,
            limit
        ));
        let envelope: IdsEnvelope = self
            .get_json(url, self.timeouts.for_limit(limit), "id listing")
            .await?;
        Ok(envelope.into_page())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn fetch_by_ids(&self, collection: &str, ids: &[String]) -> Result<ShapedPage> {
        let body = serde_json::to_vec(&ByIdsBody { ids, collection })
            .map_err(|e| TransportError::Decode(format!("by-ids body: {}", e)))?;

        let envelope: DataEnvelope = self
            .send_json(
                HttpMethod::Post,
                self.url("/vehicles/by-ids"),
                Some(Bytes::from(body)),
                self.timeouts.for_limit(ids.len()),
                "by ids",
            )
            .await?;
        Ok(ShapedPage::from_values(envelope.data))
    }

    #[instrument(skip(self))]
    async fn list_files(&self, page: u64, limit: usize) -> Result<FileListing> {
        let url = self.url(&format!("/files?page={}&limit={}", page, limit));
        let envelope: FilesEnvelope = self
            .get_json(url, self.timeouts.for_limit(0), "file listing")
            .await?;

        let pagination = envelope.pagination.unwrap_or_default();
        Ok(FileListing {
            files: envelope.data,
            page: pagination.page.unwrap_or(page),
            total: pagination.total,
            total_pages: pagination.total_pages,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_file_page(&self, name: &str, page: u64, limit: usize) -> Result<ShapedPage> {
        let url = self.url(&format!(
            "/files/{}/records?page={}&limit={}",
            urlencoding::encode(name),
            page,
            limit
        ));
        let envelope: FileRecordsEnvelope = self
            .get_json(url, self.timeouts.for_limit(limit), "file records")
            .await?;

        let details = envelope.upload_details.unwrap_or_default();
        let mut shaped = ShapedPage::from_values(envelope.data);
        shaped.total = envelope
            .pagination
            .and_then(|p| p.total)
            .or(details.total_records);
        shaped.remote_updated_at = details.updated_at;
        Ok(shaped)
    }
}
