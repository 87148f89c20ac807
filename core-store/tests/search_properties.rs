//! Lookup results must match a brute-force scan, with the index cold or warm.

use core_store::db::create_test_pool;
use core_store::{SqliteVehicleStore, VehicleRecord, VehicleStore};

const RECORDS: usize = 2_000;

fn dataset() -> Vec<VehicleRecord> {
    (0..RECORDS)
        .map(|i| {
            let registration = format!("MH{:02}AB{:04}", i % 37, (i * 7919) % 10_000);
            let chassis = format!("MA3{:X}Z{:05}", (i * 31) % 4096, i);
            VehicleRecord::new(format!("veh-{:05}", i))
                .with_registration(registration)
                .with_chassis(chassis)
                .with_collection(if i % 2 == 0 { "cars" } else { "bikes" })
        })
        .collect()
}

fn expected_by_suffix(records: &[VehicleRecord], suffix: &str) -> Vec<String> {
    let mut ids: Vec<String> = records
        .iter()
        .filter(|r| {
            r.registration_number
                .as_deref()
                .map(|reg| reg.ends_with(suffix))
                .unwrap_or(false)
        })
        .map(|r| r.id.clone())
        .collect();
    ids.sort();
    ids
}

fn expected_by_chassis(records: &[VehicleRecord], needle: &str) -> Vec<String> {
    let needle = needle.to_lowercase();
    let mut ids: Vec<String> = records
        .iter()
        .filter(|r| {
            r.chassis_number
                .as_deref()
                .map(|c| c.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .map(|r| r.id.clone())
        .collect();
    ids.sort();
    ids
}

fn ids(records: Vec<VehicleRecord>) -> Vec<String> {
    records.into_iter().map(|r| r.id).collect()
}

async fn seeded_store() -> (SqliteVehicleStore, Vec<VehicleRecord>) {
    let store = SqliteVehicleStore::new(create_test_pool().await.unwrap())
        .with_max_results(RECORDS);
    let records = dataset();
    for batch in records.chunks(500) {
        store.upsert(batch).await.unwrap();
    }
    (store, records)
}

#[core_async::test]
async fn test_suffix_search_matches_brute_force() {
    let (store, records) = seeded_store().await;
    let suffixes = ["0000", "7919", "5838", "1234", "9999"];

    for suffix in suffixes {
        let expected = expected_by_suffix(&records, suffix);
        assert_eq!(ids(store.query_by_suffix(suffix).await.unwrap()), expected);
    }

    store.rebuild_index().await.unwrap();
    for suffix in suffixes {
        let expected = expected_by_suffix(&records, suffix);
        assert_eq!(ids(store.query_by_suffix(suffix).await.unwrap()), expected);
    }
}

#[core_async::test]
async fn test_chassis_search_matches_brute_force() {
    let (store, records) = seeded_store().await;
    let needles = ["ma3", "z0001", "F", "3a", "1Z0", "z01999", "00000"];

    for needle in needles {
        let expected = if needle.trim().chars().count() < 3 {
            Vec::new()
        } else {
            expected_by_chassis(&records, needle)
        };
        assert_eq!(
            ids(store.query_by_chassis_substring(needle).await.unwrap()),
            expected,
            "cold lookup for {}",
            needle
        );
    }

    store.rebuild_index().await.unwrap();
    for needle in needles {
        let expected = if needle.trim().chars().count() < 3 {
            Vec::new()
        } else {
            expected_by_chassis(&records, needle)
        };
        assert_eq!(
            ids(store.query_by_chassis_substring(needle).await.unwrap()),
            expected,
            "warm lookup for {}",
            needle
        );
    }
}

#[core_async::test]
async fn test_reingest_is_idempotent() {
    let (store, records) = seeded_store().await;
    let before = store.get("veh-00042").await.unwrap();

    let mut unchanged = 0;
    for batch in records.chunks(500) {
        let report = store.upsert(batch).await.unwrap();
        assert_eq!(report.written, 0);
        unchanged += report.unchanged;
    }

    assert_eq!(unchanged, RECORDS as u64);
    assert_eq!(store.count().await.unwrap(), RECORDS as u64);
    assert_eq!(store.get("veh-00042").await.unwrap(), before);
}
