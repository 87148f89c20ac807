//! Vehicle store trait and SQLite implementation

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StoreError};
use crate::index::{IndexSnapshot, SearchIndex};
use crate::models::{
    normalize_chassis_needle, normalize_suffix_query, IndexStats, UpsertReport, VehicleRecord,
};

/// Default cap on rows returned by a lookup.
pub const DEFAULT_MAX_RESULTS: usize = 500;

/// Bound parameters per `IN (...)` statement.
const ID_CHUNK: usize = 500;

const RECORD_COLUMNS: &str = "id, registration_number, registration_suffix, chassis_number, \
     chassis_lower, loan_number, bank, make, customer_name, address, category, collection, \
     updated_at";

/// Local vehicle store interface
#[async_trait]
pub trait VehicleStore: Send + Sync {
    /// Insert or replace records by id in one transaction.
    ///
    /// Identical rows are left untouched and counted as `unchanged`. A record
    /// that fails validation or its statement is logged and counted as
    /// `rejected` without aborting the batch.
    ///
    /// # Errors
    /// Returns [`StoreError::Capacity`] when the database is full; the whole
    /// batch is rolled back.
    async fn upsert(&self, batch: &[VehicleRecord]) -> Result<UpsertReport>;

    /// Records whose registration ends with `suffix` (exactly four characters
    /// after normalization; anything else yields no results).
    async fn query_by_suffix(&self, suffix: &str) -> Result<Vec<VehicleRecord>>;

    /// Records whose lowercased chassis contains `needle` (at least three
    /// characters; shorter needles yield no results).
    async fn query_by_chassis_substring(&self, needle: &str) -> Result<Vec<VehicleRecord>>;

    async fn get(&self, id: &str) -> Result<Option<VehicleRecord>>;

    async fn count(&self) -> Result<u64>;

    /// Delete every record and the seen set. Returns the number of records
    /// removed.
    async fn clear_all(&self) -> Result<u64>;

    /// The subset of `ids` already stored.
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    /// Every stored id, ascending.
    async fn all_ids(&self) -> Result<Vec<String>>;

    /// Add ids to the session seen set.
    async fn mark_seen(&self, ids: &[String]) -> Result<()>;

    async fn seen_count(&self) -> Result<u64>;

    /// Delete every record whose id is not in the seen set. Returns the
    /// number of records removed.
    ///
    /// With `collections`, only records stored under one of those
    /// collections are candidates; everything else is left alone.
    async fn delete_not_seen(&self, collections: Option<&[String]>) -> Result<u64>;

    /// Empty the seen set.
    async fn reset_seen(&self) -> Result<()>;

    /// Rebuild the in-memory search index from a full table scan.
    async fn rebuild_index(&self) -> Result<IndexStats>;
}

/// SQLite implementation of [`VehicleStore`], with the search index used as
/// the fast path for lookups once warm.
pub struct SqliteVehicleStore {
    pool: SqlitePool,
    index: Arc<SearchIndex>,
    max_results: usize,
}

impl SqliteVehicleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            index: Arc::new(SearchIndex::new()),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn limit(&self) -> i64 {
        i64::try_from(self.max_results).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl VehicleStore for SqliteVehicleStore {
    #[instrument(skip(self, batch), fields(batch = batch.len()))]
    async fn upsert(&self, batch: &[VehicleRecord]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let mut tx = self.pool.begin().await?;

        for record in batch {
            let record = record.clone().normalized();
            if let Err(message) = record.validate() {
                warn!(id = %record.id, %message, "Rejecting invalid vehicle record");
                report.rejected += 1;
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO vehicles (
                    id, registration_number, registration_suffix, chassis_number,
                    chassis_lower, loan_number, bank, make, customer_name, address,
                    category, collection, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    registration_number = excluded.registration_number,
                    registration_suffix = excluded.registration_suffix,
                    chassis_number = excluded.chassis_number,
                    chassis_lower = excluded.chassis_lower,
                    loan_number = excluded.loan_number,
                    bank = excluded.bank,
                    make = excluded.make,
                    customer_name = excluded.customer_name,
                    address = excluded.address,
                    category = excluded.category,
                    collection = excluded.collection,
                    updated_at = excluded.updated_at
                WHERE vehicles.registration_number IS NOT excluded.registration_number
                   OR vehicles.chassis_number IS NOT excluded.chassis_number
                   OR vehicles.loan_number IS NOT excluded.loan_number
                   OR vehicles.bank IS NOT excluded.bank
                   OR vehicles.make IS NOT excluded.make
                   OR vehicles.customer_name IS NOT excluded.customer_name
                   OR vehicles.address IS NOT excluded.address
                   OR vehicles.category IS NOT excluded.category
                   OR vehicles.collection IS NOT excluded.collection
                   OR vehicles.updated_at IS NOT excluded.updated_at
                "#,
            )
            .bind(&record.id)
            .bind(&record.registration_number)
            .bind(&record.registration_suffix)
            .bind(&record.chassis_number)
            .bind(&record.chassis_lower)
            .bind(&record.loan_number)
            .bind(&record.bank)
            .bind(&record.make)
            .bind(&record.customer_name)
            .bind(&record.address)
            .bind(&record.category)
            .bind(&record.collection)
            .bind(&record.updated_at)
            .execute(&mut *tx)
            .await;

            match result.map_err(StoreError::from) {
                Ok(done) => {
                    if done.rows_affected() > 0 {
                        report.written += 1;
                    } else {
                        report.unchanged += 1;
                    }
                    report.accepted_ids.push(record.id);
                }
                Err(e) if e.is_capacity() => {
                    warn!(error = %e, "Store is full, rolling back batch");
                    return Err(e);
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Skipping vehicle record");
                    report.rejected += 1;
                }
            }
        }

        tx.commit().await?;

        debug!(
            written = report.written,
            unchanged = report.unchanged,
            rejected = report.rejected,
            "Upsert batch committed"
        );
        Ok(report)
    }

    async fn query_by_suffix(&self, suffix: &str) -> Result<Vec<VehicleRecord>> {
        let Some(suffix) = normalize_suffix_query(suffix) else {
            return Ok(Vec::new());
        };

        if let Some(snapshot) = self.index.current().await {
            return Ok(snapshot.by_suffix(&suffix, self.max_results));
        }

        let sql = format!(
            "SELECT {} FROM vehicles WHERE registration_suffix = ? ORDER BY id LIMIT ?",
            RECORD_COLUMNS
        );
        let records = sqlx::query_as::<_, VehicleRecord>(&sql)
            .bind(&suffix)
            .bind(self.limit())
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn query_by_chassis_substring(&self, needle: &str) -> Result<Vec<VehicleRecord>> {
        let Some(needle) = normalize_chassis_needle(needle) else {
            return Ok(Vec::new());
        };

        if let Some(snapshot) = self.index.current().await {
            return Ok(snapshot.by_chassis(&needle, self.max_results));
        }

        let sql = format!(
            "SELECT {} FROM vehicles \
             WHERE chassis_lower IS NOT NULL AND instr(chassis_lower, ?) > 0 \
             ORDER BY id LIMIT ?",
            RECORD_COLUMNS
        );
        let records = sqlx::query_as::<_, VehicleRecord>(&sql)
            .bind(&needle)
            .bind(self.limit())
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<VehicleRecord>> {
        let sql = format!("SELECT {} FROM vehicles WHERE id = ?", RECORD_COLUMNS);
        let record = sqlx::query_as::<_, VehicleRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vehicles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM vehicles")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM sync_seen")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.index.invalidate().await;
        info!(removed, "Local vehicle store cleared");
        Ok(removed)
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();
        for chunk in ids.chunks(ID_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id FROM vehicles WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&self.pool).await?;
            existing.extend(rows.into_iter().map(|(id,)| id));
        }
        Ok(existing)
    }

    async fn all_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM vehicles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn mark_seen(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in ids.chunks(ID_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO sync_seen (id) ");
            builder.push_values(chunk, |mut row, id| {
                row.push_bind(id);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn seen_count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_seen")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn delete_not_seen(&self, collections: Option<&[String]>) -> Result<u64> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM vehicles WHERE id NOT IN (SELECT id FROM sync_seen)");
        if let Some(collections) = collections {
            if collections.is_empty() {
                return Ok(0);
            }
            builder.push(" AND collection IN (");
            let mut separated = builder.separated(", ");
            for collection in collections {
                separated.push_bind(collection);
            }
            separated.push_unseparated(")");
        }

        let removed = builder.build().execute(&self.pool).await?.rows_affected();

        info!(
            removed,
            scoped = collections.is_some(),
            "Deleted records absent from the remote enumeration"
        );
        Ok(removed)
    }

    async fn reset_seen(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_seen")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rebuild_index(&self) -> Result<IndexStats> {
        let sql = format!("SELECT {} FROM vehicles ORDER BY id", RECORD_COLUMNS);
        let records = sqlx::query_as::<_, VehicleRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let snapshot = IndexSnapshot::build(records);
        let stats = self.index.replace(snapshot).await;

        info!(
            records = stats.records,
            suffix_keys = stats.suffix_keys,
            chassis_buckets = stats.chassis_buckets,
            "Search index rebuilt"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn create_store() -> SqliteVehicleStore {
        SqliteVehicleStore::new(create_test_pool().await.unwrap())
    }

    fn vehicle(id: &str, registration: &str, chassis: &str) -> VehicleRecord {
        VehicleRecord::new(id)
            .with_registration(registration)
            .with_chassis(chassis)
            .with_collection("cars")
    }

    #[core_async::test]
    async fn test_upsert_and_get() {
        let store = create_store().await;

        let report = store
            .upsert(&[vehicle("v1", "MH12AB1234", "MA3EWDE1S00123456")])
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.accepted_ids, vec!["v1".to_string()]);

        let stored = store.get("v1").await.unwrap().unwrap();
        assert_eq!(stored.registration_suffix.as_deref(), Some("1234"));
        assert_eq!(stored.chassis_lower.as_deref(), Some("ma3ewde1s00123456"));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[core_async::test]
    async fn test_identical_upsert_is_unchanged() {
        let store = create_store().await;
        let batch = vec![
            vehicle("v1", "MH12AB1234", "CH1"),
            vehicle("v2", "KA01XY0001", "CH2"),
        ];

        let first = store.upsert(&batch).await.unwrap();
        let before = store.get("v1").await.unwrap();
        let second = store.upsert(&batch).await.unwrap();

        assert_eq!(first.written, 2);
        assert_eq!(second.written, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.accepted_ids.len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.get("v1").await.unwrap(), before);
    }

    #[core_async::test]
    async fn test_changed_record_is_replaced() {
        let store = create_store().await;
        store
            .upsert(&[vehicle("v1", "MH12AB1234", "CH1")])
            .await
            .unwrap();

        let report = store
            .upsert(&[vehicle("v1", "MH12AB9999", "CH1")])
            .await
            .unwrap();

        assert_eq!(report.written, 1);
        let stored = store.get("v1").await.unwrap().unwrap();
        assert_eq!(stored.registration_suffix.as_deref(), Some("9999"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[core_async::test]
    async fn test_invalid_record_does_not_abort_batch() {
        let store = create_store().await;

        let report = store
            .upsert(&[
                vehicle("v1", "MH12AB1234", "CH1"),
                VehicleRecord::new("   "),
                vehicle("v2", "MH12AB5678", "CH2"),
            ])
            .await
            .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[core_async::test]
    async fn test_suffix_query_cold_and_warm() {
        let store = create_store().await;
        store
            .upsert(&[
                vehicle("b", "KA01XY1234", "CH-B"),
                vehicle("a", "MH12AB1234", "CH-A"),
                vehicle("c", "DL3CAF0001", "CH-C"),
            ])
            .await
            .unwrap();

        let cold: Vec<_> = store
            .query_by_suffix("1234")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(cold, vec!["a", "b"]);

        store.rebuild_index().await.unwrap();
        let warm: Vec<_> = store
            .query_by_suffix(" 12 34 ")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(warm, cold);

        assert!(store.query_by_suffix("123").await.unwrap().is_empty());
        assert!(store.query_by_suffix("12345").await.unwrap().is_empty());
    }

    #[core_async::test]
    async fn test_chassis_query_cold_and_warm() {
        let store = create_store().await;
        store
            .upsert(&[
                vehicle("a", "MH12AB1234", "MA3EWDE1S00123456"),
                vehicle("b", "KA01XY1234", "ME4JC1234XYZ"),
                vehicle("c", "DL3CAF0001", "XYZ-789"),
            ])
            .await
            .unwrap();

        let cold: Vec<_> = store
            .query_by_chassis_substring("XYZ")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(cold, vec!["b", "c"]);

        store.rebuild_index().await.unwrap();
        let warm: Vec<_> = store
            .query_by_chassis_substring("xyz")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(warm, cold);

        assert!(store.query_by_chassis_substring("xy").await.unwrap().is_empty());
    }

    #[core_async::test]
    async fn test_max_results_caps_both_paths() {
        let store = create_store().await.with_max_results(2);
        let batch: Vec<_> = (0..5)
            .map(|i| vehicle(&format!("v{}", i), "MH12AB1234", "ABCDEF"))
            .collect();
        store.upsert(&batch).await.unwrap();

        assert_eq!(store.query_by_suffix("1234").await.unwrap().len(), 2);
        store.rebuild_index().await.unwrap();
        assert_eq!(store.query_by_chassis_substring("bcd").await.unwrap().len(), 2);
    }

    #[core_async::test]
    async fn test_seen_set_sweep() {
        let store = create_store().await;
        store
            .upsert(&[
                vehicle("a", "MH12AB0001", "CH1"),
                vehicle("b", "MH12AB0002", "CH2"),
                vehicle("c", "MH12AB0003", "CH3"),
            ])
            .await
            .unwrap();

        store.reset_seen().await.unwrap();
        store
            .mark_seen(&["a".to_string(), "c".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(store.seen_count().await.unwrap(), 2);

        let removed = store.delete_not_seen(None).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.all_ids().await.unwrap(), vec!["a", "c"]);

        store.reset_seen().await.unwrap();
        assert_eq!(store.seen_count().await.unwrap(), 0);
    }

    #[core_async::test]
    async fn test_scoped_sweep_spares_other_collections() {
        let store = create_store().await;
        store
            .upsert(&[
                vehicle("a1", "MH12AB0001", "CH1").with_collection("cars"),
                vehicle("a2", "MH12AB0002", "CH2").with_collection("cars"),
                vehicle("b1", "MH12AB0003", "CH3").with_collection("bikes"),
                vehicle("b2", "MH12AB0004", "CH4").with_collection("bikes"),
                VehicleRecord::new("x")
                    .with_registration("MH12AB0005")
                    .with_chassis("CH5"),
            ])
            .await
            .unwrap();

        store.reset_seen().await.unwrap();
        store.mark_seen(&["b1".to_string()]).await.unwrap();

        let scope = vec!["bikes".to_string()];
        assert_eq!(store.delete_not_seen(Some(scope.as_slice())).await.unwrap(), 1);
        assert_eq!(store.all_ids().await.unwrap(), vec!["a1", "a2", "b1", "x"]);

        let nothing: Vec<String> = Vec::new();
        assert_eq!(store.delete_not_seen(Some(nothing.as_slice())).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[core_async::test]
    async fn test_existing_ids_spans_chunks() {
        let store = create_store().await;
        let batch: Vec<_> = (0..1200)
            .map(|i| vehicle(&format!("v{:05}", i), "MH12AB1234", "CH"))
            .collect();
        store.upsert(&batch).await.unwrap();

        let mut lookup: Vec<String> = (1000..1300).map(|i| format!("v{:05}", i)).collect();
        lookup.extend((0..700).map(|i| format!("v{:05}", i)));

        let existing = store.existing_ids(&lookup).await.unwrap();
        assert_eq!(existing.len(), 900);
        assert!(existing.contains("v01199"));
        assert!(!existing.contains("v01200"));
    }

    #[core_async::test]
    async fn test_clear_all_invalidates_index() {
        let store = create_store().await;
        store
            .upsert(&[vehicle("a", "MH12AB1234", "CH1")])
            .await
            .unwrap();
        store.mark_seen(&["a".to_string()]).await.unwrap();
        store.rebuild_index().await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.seen_count().await.unwrap(), 0);
        assert!(!store.index().is_warm().await);
        assert!(store.query_by_suffix("1234").await.unwrap().is_empty());
    }
}
