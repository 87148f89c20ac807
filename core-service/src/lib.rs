//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided bridges from a [`CoreConfig`] into the
//! transport, store and sync crates, and exposes the handful of operations a
//! presentation layer needs: start a sync, observe it, search offline.
//!
//! Desktop apps typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`] fall back to the `bridge-desktop` adapters; mobile hosts
//! inject their own.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .database_path("/data/fieldsync/vehicles.db")
//!     .api_base_url("https://api.example.com")
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//!
//! let mut progress = core.subscribe_progress();
//! core.start_sync(SyncRequest::new(SyncMode::Auto)).await;
//! let hits = core.search_by_suffix("1234").await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, SyncSettings};
pub use core_runtime::events::{CoreEvent, EventStream, LibraryEvent, SyncEvent};
pub use core_store::VehicleRecord;
pub use core_sync::{
    ProgressSubscription, SessionState, SessionStatus, StartOutcome, SyncMode, SyncRequest,
    SyncResult, SyncStats,
};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{MemorySecureStore, ReqwestHttpClient, SqliteSettingsStore};
#[cfg(feature = "secure-store")]
pub use bridge_desktop::KeyringSecureStore;

use bridge_traits::storage::SettingsStore;
use core_runtime::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use core_store::db::{create_pool, DatabaseConfig};
use core_store::{SqliteVehicleStore, VehicleStore};
use core_sync::SyncOrchestrator;
use core_transport::{HttpRecordSource, RecordSource, SecureStoreCredentials};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Primary façade exposed to host applications.
///
/// Cheap to clone; every clone shares the same store, orchestrator and
/// event bus.
#[derive(Clone)]
pub struct CoreService {
    store: Arc<SqliteVehicleStore>,
    orchestrator: Arc<SyncOrchestrator>,
    event_bus: EventBus,
}

impl CoreService {
    /// Open the local store and wire the HTTP transport described by `config`.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.sync.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path))
            .await
            .map_err(|e| CoreError::InitializationFailed(format!("open local store: {}", e)))?;
        let store = Arc::new(SqliteVehicleStore::new(pool));

        let credentials = Arc::new(SecureStoreCredentials::new(config.secure_store.clone()));
        let source = Arc::new(HttpRecordSource::new(
            config.api_base_url.clone(),
            config.http_client.clone(),
            credentials,
            &config.sync,
        ));

        let service = Self::from_parts(
            source,
            store,
            config.settings_store.clone(),
            config.sync.clone(),
            EventBus::new(DEFAULT_EVENT_BUFFER_SIZE),
        );
        service.warm_index().await;

        info!(api_base_url = %config.api_base_url, "Core service ready");
        Ok(service)
    }

    /// Assemble a service from already constructed parts.
    pub fn from_parts(
        source: Arc<dyn RecordSource>,
        store: Arc<SqliteVehicleStore>,
        settings_store: Arc<dyn SettingsStore>,
        settings: SyncSettings,
        event_bus: EventBus,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            source,
            store.clone(),
            settings_store,
            settings,
            event_bus.clone(),
        ));
        Self {
            store,
            orchestrator,
            event_bus,
        }
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Run one sync session. Returns `started: false` when one is already
    /// running.
    pub async fn start_sync(&self, request: SyncRequest) -> StartOutcome {
        self.orchestrator.start(request).await
    }

    pub fn is_syncing(&self) -> bool {
        self.orchestrator.is_running()
    }

    pub fn subscribe_progress(&self) -> ProgressSubscription {
        self.orchestrator.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        self.orchestrator.current_state()
    }

    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    // ========================================================================
    // Local store
    // ========================================================================

    /// Records whose registration ends with the 4-character `suffix`.
    pub async fn search_by_suffix(&self, suffix: &str) -> Result<Vec<VehicleRecord>> {
        Ok(self.store.query_by_suffix(suffix).await?)
    }

    /// Records whose chassis number contains `needle` (at least 3 characters).
    pub async fn search_by_chassis(&self, needle: &str) -> Result<Vec<VehicleRecord>> {
        Ok(self.store.query_by_chassis_substring(needle).await?)
    }

    pub async fn record(&self, id: &str) -> Result<Option<VehicleRecord>> {
        Ok(self.store.get(id).await?)
    }

    pub async fn record_count(&self) -> Result<u64> {
        Ok(self.store.count().await?)
    }

    /// Remove every local record and forget all sync checkpoints, so the
    /// next session downloads everything again.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<u64> {
        let cleared = self
            .orchestrator
            .exclusive(|| async {
                let removed = self.store.clear_all().await?;
                self.orchestrator.checkpoints().clear().await?;
                Ok::<_, CoreError>(removed)
            })
            .await;

        let Some(cleared) = cleared else {
            return Err(CoreError::SyncInProgress {
                operation: "clearing the local store".to_string(),
            });
        };
        let removed = cleared?;
        self.warm_index().await;

        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::StoreCleared { removed }))
            .ok();
        info!(removed, "Local data cleared");
        Ok(removed)
    }

    async fn warm_index(&self) {
        match self.store.rebuild_index().await {
            Ok(stats) => {
                self.event_bus
                    .emit(CoreEvent::Library(LibraryEvent::IndexRebuilt {
                        records: stats.records,
                        suffix_keys: stats.suffix_keys,
                        chassis_buckets: stats.chassis_buckets,
                    }))
                    .ok();
            }
            Err(e) => warn!(error = %e, "Search index unavailable; lookups scan the table"),
        }
    }
}
