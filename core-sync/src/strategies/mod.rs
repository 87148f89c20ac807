//! # Sync Strategies
//!
//! Each strategy realizes one download policy on top of a [`RecordSource`]
//! and a [`VehicleStore`].
//!
//! ## Overview
//!
//! | Strategy | Fetches | Enumerates everything |
//! |----------|---------|-----------------------|
//! | [`BulkStrategy`] | one response per collection filter | yes |
//! | [`ChunkedStrategy`] | adaptive offset pages | yes |
//! | [`PerFileStrategy`] | one page per upload file per session | no |
//! | [`MissingOnlyStrategy`] | ids, then only records absent locally | yes |
//! | [`IncrementalStrategy`] | pages changed since the last session | no |
//!
//! Every strategy routes records through `ingest`, which upserts them and
//! marks the accepted ids into the session's seen set.

mod adaptive;
mod bulk;
mod chunked;
mod incremental;
mod missing_only;
mod per_file;

pub use adaptive::{AdaptiveChunker, FailureAction};
pub use bulk::BulkStrategy;
pub use chunked::ChunkedStrategy;
pub use incremental::IncrementalStrategy;
pub use missing_only::MissingOnlyStrategy;
pub use per_file::PerFileStrategy;

use crate::checkpoint::CheckpointStore;
use crate::progress::ProgressSink;
use crate::session::SyncMode;
use crate::{Result, SyncError};
use async_trait::async_trait;
use core_async::task::CooperativeYield;
use core_runtime::config::SyncSettings;
use core_store::{VehicleRecord, VehicleStore};
use core_transport::{CollectionStats, RecordSource, RemoteVehicle, ShapedPage};
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait SyncStrategy: Send + Sync {
    fn mode(&self) -> SyncMode;

    async fn run(&self, ctx: &SessionContext) -> Result<StrategyOutcome>;
}

/// Strategy implementing a concrete mode.
///
/// `Auto` must be resolved by the caller first; it falls back to chunked.
pub fn strategy_for(mode: SyncMode) -> Box<dyn SyncStrategy> {
    match mode {
        SyncMode::Bulk => Box::new(BulkStrategy),
        SyncMode::Chunked | SyncMode::Auto => Box::new(ChunkedStrategy::new()),
        SyncMode::PerFile => Box::new(PerFileStrategy),
        SyncMode::MissingOnly => Box::new(MissingOnlyStrategy),
        SyncMode::Incremental => Box::new(IncrementalStrategy),
    }
}

// ============================================================================
// Context & Outcome
// ============================================================================

/// Everything a strategy needs for one session.
pub struct SessionContext {
    pub session_id: String,
    pub source: Arc<dyn RecordSource>,
    pub store: Arc<dyn VehicleStore>,
    pub checkpoints: CheckpointStore,
    pub progress: Arc<dyn ProgressSink>,
    pub settings: SyncSettings,
    pub mirror: bool,
    /// Collection filter; `None` means every collection the server reports
    pub collections: Option<Vec<String>>,
    /// Stats already fetched while resolving the mode
    pub known_stats: Option<Vec<CollectionStats>>,
}

/// A collection to enumerate and its expected size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPlan {
    pub name: String,
    pub total: Option<u64>,
}

impl SessionContext {
    /// Collections to walk, in server order, restricted to the filter.
    ///
    /// When stats cannot be fetched but an explicit filter exists, the
    /// filter is used with unknown totals.
    pub async fn plan_collections(&self) -> Result<Vec<CollectionPlan>> {
        let stats = match &self.known_stats {
            Some(stats) => Ok(stats.clone()),
            None => self.source.stats().await,
        };

        match (stats, &self.collections) {
            (Ok(stats), None) => Ok(stats
                .into_iter()
                .map(|s| CollectionPlan {
                    name: s.name,
                    total: Some(s.count),
                })
                .collect()),
            (Ok(stats), Some(filter)) => Ok(filter
                .iter()
                .map(|name| CollectionPlan {
                    name: name.clone(),
                    total: stats.iter().find(|s| &s.name == name).map(|s| s.count),
                })
                .collect()),
            (Err(e), Some(filter)) if !e.is_unauthorized() => {
                warn!(error = %e, "Stats unavailable; walking configured collections");
                Ok(filter
                    .iter()
                    .map(|name| CollectionPlan {
                        name: name.clone(),
                        total: None,
                    })
                    .collect())
            }
            (Err(e), _) => Err(e.into()),
        }
    }

    pub fn yielder(&self) -> CooperativeYield {
        CooperativeYield::new(self.settings.yield_interval)
    }
}

/// Counters produced by one strategy run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyOutcome {
    /// Elements received, accepted or not
    pub fetched: u64,
    pub written: u64,
    pub unchanged: u64,
    pub rejected: u64,
    pub failed_units: u64,
    pub aborted_collections: Vec<String>,
    pub emergency_pauses: u32,
}

impl StrategyOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_units == 0 && self.aborted_collections.is_empty()
    }
}

// ============================================================================
// Ingestion
// ============================================================================

/// Upsert one page and mark what landed as seen.
///
/// Records are written in batches of at most `max_chunk_size` with a
/// cooperative yield between them. Store failures abort the session.
pub(crate) async fn ingest(
    ctx: &SessionContext,
    page: ShapedPage,
    defaults: &RecordDefaults<'_>,
    outcome: &mut StrategyOutcome,
) -> Result<()> {
    outcome.fetched += page.received();
    outcome.rejected += page.rejected;

    let mut records = Vec::with_capacity(page.records.len());
    for remote in page.records {
        match to_record(remote, defaults) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(error = %e, "Skipping vehicle record");
                outcome.rejected += 1;
            }
        }
    }

    let mut yielder = ctx.yielder();
    for batch in records.chunks(ctx.settings.max_chunk_size.max(1)) {
        let report = ctx.store.upsert(batch).await?;
        outcome.written += report.written;
        outcome.unchanged += report.unchanged;
        outcome.rejected += report.rejected;
        ctx.store.mark_seen(&report.accepted_ids).await?;
        yielder.maybe_yield().await;
    }

    debug!(
        fetched = outcome.fetched,
        written = outcome.written,
        "Ingested page"
    );
    Ok(())
}

/// Values filled into records that do not carry them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RecordDefaults<'a> {
    pub collection: Option<&'a str>,
    pub category: Option<&'a str>,
}

impl<'a> RecordDefaults<'a> {
    pub fn collection(collection: &'a str) -> Self {
        Self {
            collection: Some(collection),
            category: None,
        }
    }
}

pub(crate) fn to_record(
    remote: RemoteVehicle,
    defaults: &RecordDefaults<'_>,
) -> Result<VehicleRecord> {
    let Some(id) = remote.record_id().map(str::to_string) else {
        return Err(SyncError::Data("record without identifier".to_string()));
    };

    let record = VehicleRecord {
        id,
        registration_number: remote.registration_number,
        chassis_number: remote.chassis_number,
        loan_number: remote.loan_number,
        bank: remote.bank,
        make: remote.make,
        customer_name: remote.customer_name,
        address: remote.address,
        category: remote
            .category
            .or_else(|| defaults.category.map(str::to_string)),
        collection: remote
            .collection
            .or_else(|| defaults.collection.map(str::to_string)),
        updated_at: remote.updated_at,
        ..VehicleRecord::default()
    }
    .normalized();

    record
        .validate()
        .map_err(|message| SyncError::Data(format!("{}: {}", record.id, message)))?;
    Ok(record)
}
