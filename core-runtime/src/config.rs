//! # Core Configuration Module
//!
//! Provides configuration management for the FieldSync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every bridge and tunable the sync core needs. It
//! enforces fail-fast validation so a misconfigured host learns about it at
//! bootstrap, not in the middle of a 250 000-record download.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Transport for the remote vehicle service
//! - `SecureStore` - Holds the bearer credential
//! - `SettingsStore` - Holds sync checkpoints
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults for all
//! three are injected automatically if not provided.
//!
//! ## Sync Tunables
//!
//! [`SyncSettings`] groups the strategy thresholds, adaptive chunk bounds,
//! retry policy, rate limiter and timeout scaling. Every value has a default
//! suitable for a mobile connection; hosts override individual fields.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/fieldsync/vehicles.db")
//!     .api_base_url("https://api.example.com")
//!     .http_client(Arc::new(MyHttpClient))
//!     .secure_store(Arc::new(MySecureStore))
//!     .settings_store(Arc::new(MySettingsStore))
//!     .sync_settings(SyncSettings {
//!         bulk_threshold: 50_000,
//!         ..SyncSettings::default()
//!     })
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing API base URL and bridges
//! let config = CoreConfig::builder()
//!     .database_path("/data/vehicles.db")
//!     .build()
//!     .expect("Should fail - missing required settings");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, SecureStore, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Core configuration for the FieldSync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file holding vehicle records
    pub database_path: PathBuf,

    /// Base URL of the remote vehicle service (no trailing slash)
    pub api_base_url: String,

    /// HTTP client used by the transport
    pub http_client: Arc<dyn HttpClient>,

    /// Secure credential storage
    pub secure_store: Arc<dyn SecureStore>,

    /// Checkpoint storage
    pub settings_store: Arc<dyn SettingsStore>,

    /// Sync strategy, transport and progress tunables
    pub sync: SyncSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("api_base_url", &self.api_base_url)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("sync", &self.sync)
            .finish()
    }
}

// ============================================================================
// Sync Settings
// ============================================================================

/// Tunables for the sync strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// `Auto` mode picks bulk below this many remote records.
    pub bulk_threshold: u64,

    /// Lower bound for the adaptive chunk size.
    pub min_chunk_size: usize,
    /// Upper bound for the adaptive chunk size.
    pub max_chunk_size: usize,
    /// Chunk size used for the first request of a session.
    pub initial_chunk_size: usize,

    /// Lower bound for the inter-chunk delay.
    pub min_chunk_delay: Duration,
    /// Upper bound for the inter-chunk delay.
    pub max_chunk_delay: Duration,
    /// Inter-chunk delay used at session start.
    pub initial_chunk_delay: Duration,
    /// Responses slower than this shrink the chunk size.
    pub slow_response: Duration,

    /// Consecutive chunk failures before each further failure pauses.
    pub emergency_threshold: u32,
    /// Consecutive chunk failures that abort the current collection.
    pub abort_threshold: u32,
    /// Base length of an emergency pause.
    pub emergency_pause: Duration,

    /// Concurrent chunk requests in chunked mode (1 = sequential, max 3).
    pub parallelism: usize,

    /// Ids per fetch-by-ids request in missing-only mode.
    pub id_batch_size: usize,
    /// Ids per id-listing page in missing-only mode.
    pub id_page_size: usize,
    /// Records per page in per-file mode.
    pub file_page_size: usize,
    /// Files per page of the remote file listing.
    pub file_list_page_size: usize,

    /// Mirror mode when a request does not say otherwise.
    pub mirror_by_default: bool,
    /// Run the mirror sweep even when some units failed.
    pub sweep_after_partial_failure: bool,
    /// Restrict sync to these collections; `None` syncs all listed by stats.
    pub collections: Option<Vec<String>>,

    /// Long loops yield to the executor at this interval.
    pub yield_interval: Duration,
    /// Minimum time between progress emissions.
    pub progress_min_interval: Duration,
    /// Minimum percentage change between progress emissions.
    pub progress_min_delta: f64,

    pub retry: RetrySettings,
    pub limiter: LimiterSettings,
    pub timeouts: TimeoutSettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            bulk_threshold: 100_000,
            min_chunk_size: 500,
            max_chunk_size: 10_000,
            initial_chunk_size: 2_000,
            min_chunk_delay: Duration::from_millis(50),
            max_chunk_delay: Duration::from_secs(5),
            initial_chunk_delay: Duration::from_millis(250),
            slow_response: Duration::from_secs(8),
            emergency_threshold: 5,
            abort_threshold: 10,
            emergency_pause: Duration::from_secs(30),
            parallelism: 1,
            id_batch_size: 500,
            id_page_size: 5_000,
            file_page_size: 1_000,
            file_list_page_size: 50,
            mirror_by_default: false,
            sweep_after_partial_failure: true,
            collections: None,
            yield_interval: Duration::from_millis(120),
            progress_min_interval: Duration::from_millis(300),
            progress_min_delta: 1.0,
            retry: RetrySettings::default(),
            limiter: LimiterSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl SyncSettings {
    /// Validates internal consistency of the tunables.
    pub fn validate(&self) -> Result<()> {
        if self.min_chunk_size == 0 {
            return Err(Error::Config(
                "min_chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.min_chunk_size > self.max_chunk_size {
            return Err(Error::Config(format!(
                "min_chunk_size ({}) exceeds max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }

        if self.min_chunk_delay > self.max_chunk_delay {
            return Err(Error::Config(
                "min_chunk_delay exceeds max_chunk_delay".to_string(),
            ));
        }

        if self.emergency_threshold == 0 || self.emergency_threshold >= self.abort_threshold {
            return Err(Error::Config(format!(
                "emergency_threshold ({}) must be non-zero and below abort_threshold ({})",
                self.emergency_threshold, self.abort_threshold
            )));
        }

        if !(1..=3).contains(&self.parallelism) {
            return Err(Error::Config(format!(
                "parallelism must be between 1 and 3, got {}",
                self.parallelism
            )));
        }

        if self.id_batch_size == 0
            || self.id_page_size == 0
            || self.file_page_size == 0
            || self.file_list_page_size == 0
        {
            return Err(Error::Config("Page and batch sizes must be greater than 0".to_string()));
        }

        if !(0.0..=100.0).contains(&self.progress_min_delta) {
            return Err(Error::Config(
                "progress_min_delta must be a percentage between 0 and 100".to_string(),
            ));
        }

        if let Some(collections) = &self.collections {
            if collections.iter().any(|c| c.trim().is_empty()) {
                return Err(Error::Config(
                    "Collection filter contains an empty name".to_string(),
                ));
            }
        }

        self.retry.validate()?;
        self.limiter.validate()?;
        self.timeouts.validate()
    }
}

/// Retry/backoff policy for transport calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on every further attempt.
    pub base_delay: Duration,
    /// Upper bound for any single backoff.
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetrySettings {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::Config(
                "retry.base_delay exceeds retry.max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token bucket and AIMD ceiling for outgoing requests.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSettings {
    /// Requests per minute allowed at session start.
    pub initial_rpm: u32,
    /// Floor the AIMD controller never cuts below.
    pub min_rpm: u32,
    /// Ceiling the AIMD controller never raises above.
    pub max_rpm: u32,
    /// Successful responses faster than this raise the ceiling.
    pub fast_response: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            initial_rpm: 120,
            min_rpm: 10,
            max_rpm: 600,
            fast_response: Duration::from_secs(1),
        }
    }
}

impl LimiterSettings {
    fn validate(&self) -> Result<()> {
        if self.min_rpm == 0 {
            return Err(Error::Config("limiter.min_rpm must be at least 1".to_string()));
        }
        if !(self.min_rpm..=self.max_rpm).contains(&self.initial_rpm) {
            return Err(Error::Config(format!(
                "limiter.initial_rpm ({}) must lie within [{}, {}]",
                self.initial_rpm, self.min_rpm, self.max_rpm
            )));
        }
        Ok(())
    }
}

/// Per-request timeout scaling: `base + per_record * limit`, clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutSettings {
    pub base: Duration,
    pub per_record: Duration,
    pub min: Duration,
    /// Also used as the timeout for bulk dumps.
    pub max: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(15),
            per_record: Duration::from_millis(5),
            min: Duration::from_secs(10),
            max: Duration::from_secs(300),
        }
    }
}

impl TimeoutSettings {
    fn validate(&self) -> Result<()> {
        if self.min.is_zero() || self.min > self.max {
            return Err(Error::Config(
                "timeouts.min must be non-zero and not exceed timeouts.max".to_string(),
            ));
        }
        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - API base URL is an absolute http(s) URL
    /// - Sync tunables are internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https://, got '{}'",
                self.api_base_url
            )));
        }

        self.sync.validate()
    }
}

// ============================================================================
// Platform Defaults
// ============================================================================

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the vehicle service. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform-native HTTP stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the default KeyringSecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for sync checkpoints. \
                 Desktop: enable the 'desktop-shims' feature to use the default SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to build default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use core_async::runtime::{Builder, Handle};
    use std::thread;

    let candidate = database_path
        .parent()
        .map(|parent| parent.join("settings.db"))
        .unwrap_or_else(|| PathBuf::from("settings.db"));

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // A runtime cannot be blocked on from inside another one.
    let store = match Handle::try_current() {
        Ok(_) => {
            let path = candidate.clone();
            thread::spawn(move || init_store(path))
                .join()
                .map_err(|_| {
                    Error::Internal(
                        "Worker thread panicked while creating default SettingsStore".to_string(),
                    )
                })??
        }
        Err(_) => init_store(candidate)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_database_path: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and create the
/// final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    api_base_url: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    sync: Option<SyncSettings>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/data/fieldsync/vehicles.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the remote service base URL. A trailing slash is stripped.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.api_base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure store implementation.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the settings store implementation.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Replaces the default sync tunables.
    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the database path or API base URL is missing or
    ///   a tunable is inconsistent
    /// - `Error::CapabilityMissing` if a bridge is missing and no platform
    ///   default is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let api_base_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&database_path)?,
        };

        let config = CoreConfig {
            database_path,
            api_base_url,
            http_client,
            secure_store,
            settings_store,
            sync: self.sync.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse};

    type BridgeResult<T> = std::result::Result<T, BridgeError>;

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("mock".to_string()))
        }
    }

    struct MockSecureStore;

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    /// Checkpoint store that forgets everything.
    struct NullSettingsStore;

    #[async_trait]
    impl SettingsStore for NullSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn set_i64(&self, _key: &str, _value: i64) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_i64(&self, _key: &str) -> BridgeResult<Option<i64>> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn has_key(&self, _key: &str) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/data/vehicles.db")
            .api_base_url("https://api.example.com/")
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
            .settings_store(Arc::new(NullSettingsStore))
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/vehicles.db"));
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.sync, SyncSettings::default());
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .api_base_url("https://api.example.com")
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
            .settings_store(Arc::new(NullSettingsStore))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[test]
    fn test_builder_requires_api_base_url() {
        let result = CoreConfig::builder()
            .database_path("/data/vehicles.db")
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
            .settings_store(Arc::new(NullSettingsStore))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("API base URL is required"));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let result = complete_builder().api_base_url("ftp://example.com").build();
        assert!(result.unwrap_err().to_string().contains("http://"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_secure_store() {
        let result = CoreConfig::builder()
            .database_path("/data/vehicles.db")
            .api_base_url("https://api.example.com")
            .http_client(Arc::new(MockHttpClient))
            .settings_store(Arc::new(NullSettingsStore))
            .build();

        let err = result.unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing { .. }));
        assert!(err.to_string().contains("credential persistence"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let result = CoreConfig::builder()
            .database_path("/data/vehicles.db")
            .api_base_url("https://api.example.com")
            .secure_store(Arc::new(MockSecureStore))
            .settings_store(Arc::new(NullSettingsStore))
            .build();

        assert!(result.unwrap_err().to_string().contains("HttpClient"));
    }

    #[test]
    fn test_validate_rejects_inverted_chunk_bounds() {
        let result = complete_builder()
            .sync_settings(SyncSettings {
                min_chunk_size: 5_000,
                max_chunk_size: 1_000,
                ..SyncSettings::default()
            })
            .build();

        assert!(result.unwrap_err().to_string().contains("exceeds max_chunk_size"));
    }

    #[test]
    fn test_validate_rejects_parallelism_out_of_range() {
        let result = complete_builder()
            .sync_settings(SyncSettings {
                parallelism: 4,
                ..SyncSettings::default()
            })
            .build();

        assert!(result.unwrap_err().to_string().contains("parallelism"));
    }

    #[test]
    fn test_validate_rejects_emergency_above_abort() {
        let settings = SyncSettings {
            emergency_threshold: 10,
            abort_threshold: 10,
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_initial_rpm_outside_bounds() {
        let settings = SyncSettings {
            limiter: LimiterSettings {
                initial_rpm: 5,
                ..LimiterSettings::default()
            },
            ..SyncSettings::default()
        };
        assert!(settings
            .validate()
            .unwrap_err()
            .to_string()
            .contains("initial_rpm"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let settings = SyncSettings {
            retry: RetrySettings {
                max_attempts: 0,
                ..RetrySettings::default()
            },
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_default_sync_settings_are_valid() {
        let settings = SyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.bulk_threshold, 100_000);
        assert_eq!(settings.emergency_threshold, 5);
        assert_eq!(settings.abort_threshold, 10);
        assert_eq!(settings.id_batch_size, 500);
        assert!(!settings.mirror_by_default);
    }

    #[test]
    fn test_config_is_cloneable_and_debug_hides_bridges() {
        let config = complete_builder().build().unwrap();
        let cloned = config.clone();
        assert_eq!(cloned.api_base_url, config.api_base_url);

        let debug = format!("{:?}", config);
        assert!(debug.contains("HttpClient { ... }"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_settings_default() {
        let base = std::env::temp_dir().join(format!("core-runtime-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&base).unwrap();

        let config = CoreConfig::builder()
            .database_path(base.join("vehicles.db"))
            .api_base_url("https://api.example.com")
            .http_client(Arc::new(MockHttpClient))
            .secure_store(Arc::new(MockSecureStore))
            .build()
            .expect("desktop defaults should succeed");

        let settings = config.settings_store.clone();
        core_async::runtime::block_on(async move {
            settings.set_i64("sync.offset.cars", 4000).await.unwrap();
            assert_eq!(settings.get_i64("sync.offset.cars").await.unwrap(), Some(4000));
        });

        let _ = std::fs::remove_dir_all(&base);
    }
}
