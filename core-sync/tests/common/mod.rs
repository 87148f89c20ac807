//! Shared fixtures: an in-memory remote service and a wired orchestrator.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::SqliteSettingsStore;
use chrono::{DateTime, Utc};
use core_async::sync::{Mutex as AsyncMutex, Notify};
use core_async::time::Duration;
use core_runtime::config::{LimiterSettings, RetrySettings, SyncSettings};
use core_runtime::events::EventBus;
use core_store::db::create_test_pool;
use core_store::SqliteVehicleStore;
use core_sync::SyncOrchestrator;
use core_transport::{
    CollectionStats, FileListing, IdPage, PageQuery, RecordSource, RemoteFile, RemoteVehicle,
    Result as TransportResult, ShapedPage, TransportError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// Data
// ============================================================================

pub fn vehicle(id: &str, n: usize) -> RemoteVehicle {
    RemoteVehicle {
        id: Some(id.to_string()),
        registration_number: Some(format!("MH{:02}AB{:04}", n % 50, n % 10_000)),
        chassis_number: Some(format!("MA3EWD{:08}", n)),
        bank: Some("HDFC".to_string()),
        updated_at: Some("2024-01-01T00:00:00.000Z".to_string()),
        ..RemoteVehicle::default()
    }
}

pub fn vehicles(prefix: &str, count: usize) -> Vec<RemoteVehicle> {
    (0..count)
        .map(|n| vehicle(&format!("{}-{:06}", prefix, n), n))
        .collect()
}

pub fn test_settings() -> SyncSettings {
    SyncSettings {
        min_chunk_size: 100,
        max_chunk_size: 10_000,
        initial_chunk_size: 1_000,
        min_chunk_delay: Duration::ZERO,
        max_chunk_delay: Duration::from_millis(5),
        initial_chunk_delay: Duration::ZERO,
        emergency_pause: Duration::from_millis(1),
        parallelism: 1,
        yield_interval: Duration::from_millis(50),
        progress_min_interval: Duration::ZERO,
        progress_min_delta: 0.0,
        retry: RetrySettings {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
        limiter: LimiterSettings {
            initial_rpm: 60_000,
            min_rpm: 60_000,
            max_rpm: 60_000,
            ..LimiterSettings::default()
        },
        ..SyncSettings::default()
    }
}

/// Chunk size pinned to `size`.
pub fn fixed_chunk_settings(size: usize) -> SyncSettings {
    SyncSettings {
        min_chunk_size: size,
        max_chunk_size: size,
        initial_chunk_size: size,
        ..test_settings()
    }
}

// ============================================================================
// Fake remote service
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stats,
    Page { collection: String, skip: u64, limit: usize, since: bool },
    Bulk(Option<String>),
    Ids { collection: String, skip: u64 },
    ByIds { collection: String, ids: Vec<String> },
    Files(u64),
    FilePage { name: String, page: u64 },
}

/// Remote service held in memory, with call recording and fault injection.
#[derive(Default)]
pub struct FakeSource {
    collections: AsyncMutex<Vec<(String, Vec<RemoteVehicle>)>>,
    files: AsyncMutex<Vec<(RemoteFile, Vec<RemoteVehicle>)>>,
    /// Collection → remaining failing page requests (`u32::MAX` fails forever)
    page_failures: AsyncMutex<HashMap<String, u32>>,
    unauthorized: AsyncMutex<bool>,
    bulk_unavailable: AsyncMutex<bool>,
    gate: AsyncMutex<Option<Arc<Notify>>>,
    calls: AsyncMutex<Vec<Call>>,
    page_requests: AtomicU64,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_collection(&self, name: &str, records: Vec<RemoteVehicle>) {
        let mut collections = self.collections.lock().await;
        match collections.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = records,
            None => collections.push((name.to_string(), records)),
        }
    }

    pub async fn remove_records(&self, ids: &[&str]) {
        let mut collections = self.collections.lock().await;
        for (_, records) in collections.iter_mut() {
            records.retain(|r| !ids.contains(&r.id.as_deref().unwrap_or_default()));
        }
    }

    pub async fn add_file(&self, name: &str, records: Vec<RemoteVehicle>) {
        let file = RemoteFile {
            name: name.to_string(),
            category: Some("uploads".to_string()),
            total_records: records.len() as u64,
            updated_at: Some("2024-03-01T00:00:00Z".to_string()),
        };
        self.files.lock().await.push((file, records));
    }

    pub async fn fail_pages(&self, collection: &str, times: u32) {
        self.page_failures
            .lock()
            .await
            .insert(collection.to_string(), times);
    }

    pub async fn fail_bulk(&self) {
        *self.bulk_unavailable.lock().await = true;
    }

    pub async fn reject_credentials(&self) {
        *self.unauthorized.lock().await = true;
    }

    /// Hold `stats` until the returned handle is notified.
    pub async fn hold_stats(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().await = Some(notify.clone());
        notify
    }

    pub async fn remote_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .collections
            .lock()
            .await
            .iter()
            .flat_map(|(_, records)| records.iter().filter_map(|r| r.id.clone()))
            .collect();
        ids.sort();
        ids
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn by_ids_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                Call::ByIds { ids, .. } => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn page_requests(&self) -> u64 {
        self.page_requests.load(Ordering::SeqCst)
    }

    async fn record(&self, call: Call) -> TransportResult<()> {
        self.calls.lock().await.push(call);
        if *self.unauthorized.lock().await {
            return Err(TransportError::Unauthorized("token revoked".to_string()));
        }
        Ok(())
    }

    async fn collection(&self, name: &str) -> Vec<RemoteVehicle> {
        self.collections
            .lock()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, records)| records.clone())
            .unwrap_or_default()
    }
}

fn changed_since(record: &RemoteVehicle, since: DateTime<Utc>) -> bool {
    record
        .updated_at
        .as_deref()
        .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
        .map(|at| at.with_timezone(&Utc) > since)
        .unwrap_or(false)
}

fn page_of(records: &[RemoteVehicle], skip: usize, limit: usize) -> Vec<RemoteVehicle> {
    records.iter().skip(skip).take(limit).cloned().collect()
}

fn shaped(records: Vec<RemoteVehicle>) -> ShapedPage {
    ShapedPage {
        records,
        ..ShapedPage::default()
    }
}

#[async_trait]
impl RecordSource for FakeSource {
    async fn stats(&self) -> TransportResult<Vec<CollectionStats>> {
        self.record(Call::Stats).await?;
        let gate = self.gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self
            .collections
            .lock()
            .await
            .iter()
            .map(|(name, records)| CollectionStats {
                name: name.clone(),
                count: records.len() as u64,
            })
            .collect())
    }

    async fn fetch_page(&self, query: &PageQuery) -> TransportResult<ShapedPage> {
        self.record(Call::Page {
            collection: query.collection.clone(),
            skip: query.skip,
            limit: query.limit,
            since: query.since.is_some(),
        })
        .await?;
        self.page_requests.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.page_failures.lock().await;
            if let Some(remaining) = failures.get_mut(&query.collection) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(TransportError::Server {
                        status: 503,
                        message: "unavailable".to_string(),
                    });
                }
            }
        }

        let mut records = self.collection(&query.collection).await;
        if let Some(since) = query.since {
            records.retain(|r| changed_since(r, since));
        }
        Ok(shaped(page_of(&records, query.skip as usize, query.limit)))
    }

    async fn fetch_bulk(&self, collection: Option<&str>) -> TransportResult<ShapedPage> {
        self.record(Call::Bulk(collection.map(str::to_string))).await?;
        if *self.bulk_unavailable.lock().await {
            return Err(TransportError::Server {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        let records = match collection {
            Some(name) => self.collection(name).await,
            None => self
                .collections
                .lock()
                .await
                .iter()
                .flat_map(|(_, records)| records.clone())
                .collect(),
        };
        Ok(shaped(records))
    }

    async fn list_ids(&self, collection: &str, skip: u64, limit: usize) -> TransportResult<IdPage> {
        self.record(Call::Ids {
            collection: collection.to_string(),
            skip,
        })
        .await?;
        let records = self.collection(collection).await;
        Ok(IdPage {
            ids: page_of(&records, skip as usize, limit)
                .into_iter()
                .filter_map(|r| r.id)
                .collect(),
        })
    }

    async fn fetch_by_ids(&self, collection: &str, ids: &[String]) -> TransportResult<ShapedPage> {
        self.record(Call::ByIds {
            collection: collection.to_string(),
            ids: ids.to_vec(),
        })
        .await?;
        let records = self
            .collection(collection)
            .await
            .into_iter()
            .filter(|r| r.id.as_ref().map(|id| ids.contains(id)).unwrap_or(false))
            .collect();
        Ok(shaped(records))
    }

    async fn list_files(&self, page: u64, limit: usize) -> TransportResult<FileListing> {
        self.record(Call::Files(page)).await?;
        let files = self.files.lock().await;
        let total = files.len() as u64;
        let total_pages = total.div_ceil(limit as u64).max(1);
        Ok(FileListing {
            files: files
                .iter()
                .skip((page as usize - 1) * limit)
                .take(limit)
                .map(|(file, _)| file.clone())
                .collect(),
            page,
            total: Some(total),
            total_pages: Some(total_pages),
        })
    }

    async fn fetch_file_page(&self, name: &str, page: u64, limit: usize) -> TransportResult<ShapedPage> {
        self.record(Call::FilePage {
            name: name.to_string(),
            page,
        })
        .await?;
        let files = self.files.lock().await;
        let records = files
            .iter()
            .find(|(file, _)| file.name == name)
            .map(|(_, records)| page_of(records, (page as usize - 1) * limit, limit))
            .unwrap_or_default();
        Ok(ShapedPage {
            records,
            remote_updated_at: Some("2024-03-01T00:00:00Z".to_string()),
            ..ShapedPage::default()
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub store: Arc<SqliteVehicleStore>,
    pub settings_store: Arc<SqliteSettingsStore>,
    pub event_bus: EventBus,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    pub async fn new(settings: SyncSettings) -> Self {
        let source = Arc::new(FakeSource::new());
        let store = Arc::new(
            SqliteVehicleStore::new(create_test_pool().await.unwrap()).with_max_results(10_000),
        );
        let settings_store = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        Self::with_parts(source, store, settings_store, settings)
    }

    /// A fresh orchestrator over existing state, as after a process restart.
    pub fn with_parts(
        source: Arc<FakeSource>,
        store: Arc<SqliteVehicleStore>,
        settings_store: Arc<SqliteSettingsStore>,
        settings: SyncSettings,
    ) -> Self {
        let event_bus = EventBus::new(1024);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            source.clone(),
            store.clone(),
            settings_store.clone(),
            settings,
            event_bus.clone(),
        ));
        Self {
            source,
            store,
            settings_store,
            event_bus,
            orchestrator,
        }
    }

    pub fn restart(&self, settings: SyncSettings) -> Self {
        Self::with_parts(
            self.source.clone(),
            self.store.clone(),
            self.settings_store.clone(),
            settings,
        )
    }
}
