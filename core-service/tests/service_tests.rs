//! Bootstrap and façade operations over a mocked HTTP bridge.

use async_trait::async_trait;
use bridge_desktop::{MemorySecureStore, SqliteSettingsStore};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::{LimiterSettings, RetrySettings};
use core_service::{
    CoreConfig, CoreError, CoreEvent, CoreService, LibraryEvent, SyncMode, SyncRequest,
    SyncSettings,
};
use core_transport::BEARER_TOKEN_KEY;
use mockall::mock;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

fn json_response(body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

/// Three-record dataset behind the stats and bulk endpoints.
fn respond(request: &HttpRequest, stats_calls: &AtomicU32) -> BridgeResult<HttpResponse> {
    if request.url.contains("/vehicles/stats") {
        stats_calls.fetch_add(1, Ordering::SeqCst);
        return Ok(json_response(json!({
            "collections": [{"name": "main", "count": 3}]
        })));
    }
    assert!(request.url.contains("/vehicles/bulk"), "unexpected {}", request.url);
    Ok(json_response(json!({
        "data": [
            {"_id": "r1", "regNo": "MH12 AB 1234", "chassisNo": "MA3EWDE1S00123456"},
            {"_id": "r2", "regNo": "KA01XY1234", "chassisNo": "ME4JF502ABC98765"},
            {"_id": "r3", "regNo": "DL3CAB0042", "chassisNo": "MA3FHEB1S00777111"}
        ]
    })))
}

/// Serves the dataset; counts stats requests.
fn vehicle_service(stats_calls: Arc<AtomicU32>) -> MockHttpClient {
    let mut client = MockHttpClient::new();
    client
        .expect_execute()
        .returning(move |request| respond(&request, &stats_calls));
    client
}

fn database_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("fieldsync-{}-{}.db", std::process::id(), name));
    remove_database(&path);
    path
}

fn remove_database(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

async fn config(path: &PathBuf, client: MockHttpClient) -> CoreConfig {
    CoreConfig::builder()
        .database_path(path)
        .api_base_url("https://api.example.com/")
        .http_client(Arc::new(client))
        .secure_store(Arc::new(MemorySecureStore::with_secret(
            BEARER_TOKEN_KEY,
            "token-123",
        )))
        .settings_store(Arc::new(SqliteSettingsStore::in_memory().await.unwrap()))
        .sync_settings(SyncSettings {
            retry: RetrySettings {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            limiter: LimiterSettings {
                initial_rpm: 60_000,
                min_rpm: 10,
                max_rpm: 60_000,
                fast_response: Duration::from_secs(1),
            },
            ..SyncSettings::default()
        })
        .build()
        .unwrap()
}

#[core_async::test]
async fn test_bootstrap_sync_and_search() {
    let path = database_path("search");
    let stats_calls = Arc::new(AtomicU32::new(0));
    let core = CoreService::bootstrap(config(&path, vehicle_service(stats_calls)).await)
        .await
        .unwrap();

    assert_eq!(core.record_count().await.unwrap(), 0);
    assert!(core.search_by_suffix("1234").await.unwrap().is_empty());

    let outcome = core.start_sync(SyncRequest::new(SyncMode::Auto)).await;
    let result = outcome.result.unwrap();
    assert!(result.success, "{}", result.message);
    assert_eq!(result.stats.mode, SyncMode::Bulk);
    assert_eq!(core.record_count().await.unwrap(), 3);

    let mut ids: Vec<String> = core
        .search_by_suffix("1234")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["r1".to_string(), "r2".to_string()]);

    let by_chassis = core.search_by_chassis("s00777").await.unwrap();
    assert_eq!(by_chassis.len(), 1);
    assert_eq!(by_chassis[0].id, "r3");
    assert!(core.search_by_chassis("ma").await.unwrap().is_empty());

    remove_database(&path);
}

#[core_async::test]
async fn test_clear_all_resets_store_and_checkpoints() {
    let path = database_path("clear");
    let stats_calls = Arc::new(AtomicU32::new(0));
    let core = CoreService::bootstrap(config(&path, vehicle_service(stats_calls.clone())).await)
        .await
        .unwrap();

    assert!(core
        .start_sync(SyncRequest::new(SyncMode::Auto))
        .await
        .result
        .unwrap()
        .success);

    let mut events = core.events();
    assert_eq!(core.clear_all().await.unwrap(), 3);
    assert_eq!(core.record_count().await.unwrap(), 0);
    assert!(core.record("r1").await.unwrap().is_none());

    let mut cleared = false;
    while let Some(Ok(event)) = events.try_recv() {
        if event == CoreEvent::Library(LibraryEvent::StoreCleared { removed: 3 }) {
            cleared = true;
        }
    }
    assert!(cleared);

    // without a last-sync checkpoint, Auto downloads everything again
    let result = core
        .start_sync(SyncRequest::new(SyncMode::Auto))
        .await
        .result
        .unwrap();
    assert_eq!(result.stats.mode, SyncMode::Bulk);
    assert_eq!(stats_calls.load(Ordering::SeqCst), 2);
    assert_eq!(core.record_count().await.unwrap(), 3);

    remove_database(&path);
}

#[core_async::test]
async fn test_clear_all_refused_while_syncing() {
    let path = database_path("clear-busy");
    let stats_calls = AtomicU32::new(0);
    let mut client = MockHttpClient::new();
    client.expect_execute().returning(move |request| {
        if request.url.contains("/vehicles/stats") {
            // keep the session open long enough to overlap with the clear
            std::thread::sleep(Duration::from_millis(300));
        }
        respond(&request, &stats_calls)
    });
    let core = CoreService::bootstrap(config(&path, client).await)
        .await
        .unwrap();

    let syncing = core.clone();
    let session =
        core_async::spawn(async move { syncing.start_sync(SyncRequest::new(SyncMode::Auto)).await });
    for _ in 0..200 {
        if core.is_syncing() {
            break;
        }
        core_async::time::sleep(Duration::from_millis(5)).await;
    }

    let err = core.clear_all().await.unwrap_err();
    assert!(matches!(err, CoreError::SyncInProgress { .. }));

    let outcome = session.await.unwrap();
    assert!(outcome.result.unwrap().success);
    assert_eq!(core.record_count().await.unwrap(), 3);

    remove_database(&path);
}

#[core_async::test]
async fn test_bootstrap_rejects_invalid_settings() {
    let path = database_path("invalid");
    let mut config = config(&path, MockHttpClient::new()).await;
    config.sync.parallelism = 7;

    let err = CoreService::bootstrap(config).await.err().unwrap();
    assert!(matches!(err, CoreError::Config(_)));

    remove_database(&path);
}
