//! Adaptive offset pagination over every collection.
//!
//! Each collection is walked from offset 0 until its known total is reached
//! or the server returns a short page. Failed chunks are skipped and counted;
//! a long enough failure streak pauses, then abandons the collection.
//!
//! With `parallelism > 1` a window of consecutive chunks is requested
//! concurrently and ingested in offset order.
//!
//! Without mirroring, the offset after the last contiguous successful chunk
//! is checkpointed so an interrupted enumeration resumes where it stopped.
//! Mirror sessions always start from 0 because the sweep needs every id.

use super::{
    ingest, AdaptiveChunker, CollectionPlan, FailureAction, RecordDefaults, SessionContext,
    StrategyOutcome, SyncStrategy,
};
use crate::session::SyncMode;
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_async::task::CooperativeYield;
use core_async::time::{sleep, Instant};
use core_transport::PageQuery;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct ChunkedStrategy {
    since: Option<DateTime<Utc>>,
}

impl ChunkedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only records modified after `since`.
    pub fn since(since: DateTime<Utc>) -> Self {
        Self { since: Some(since) }
    }

    fn resumable(&self, ctx: &SessionContext) -> bool {
        self.since.is_none() && !ctx.mirror
    }

    fn query(&self, collection: &str, skip: u64, limit: usize) -> PageQuery {
        let query = PageQuery::new(collection, skip, limit);
        match self.since {
            Some(since) => query.since(since),
            None => query,
        }
    }

    async fn start_offset(&self, ctx: &SessionContext, collection: &str) -> u64 {
        if !self.resumable(ctx) {
            return 0;
        }
        match ctx.checkpoints.collection_offset(collection).await {
            Ok(Some(offset)) => {
                info!(collection, offset, "Resuming collection from checkpoint");
                offset
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(collection, error = %e, "Could not read offset checkpoint");
                0
            }
        }
    }

    #[instrument(skip(self, ctx, plan, chunker, outcome, yielder), fields(collection = %plan.name))]
    async fn walk_collection(
        &self,
        ctx: &SessionContext,
        plan: &CollectionPlan,
        grand_total: Option<u64>,
        chunker: &mut AdaptiveChunker,
        outcome: &mut StrategyOutcome,
        yielder: &mut CooperativeYield,
    ) -> Result<()> {
        let collection = plan.name.as_str();
        let defaults = RecordDefaults::collection(collection);
        let parallelism = ctx.settings.parallelism.clamp(1, 3);
        let resumable = self.resumable(ctx);

        // Stats totals count the whole collection, not the changed subset.
        let mut total = if self.since.is_some() { None } else { plan.total };
        let mut skip = self.start_offset(ctx, collection).await;
        let mut contiguous = true;
        let mut first = true;

        chunker.reset_failures();

        loop {
            if total.is_some_and(|total| skip >= total) {
                break;
            }
            if !first {
                sleep(chunker.delay()).await;
            }
            first = false;

            let limit = chunker.chunk_size();
            let queries: Vec<PageQuery> = (0..parallelism as u64)
                .map(|slot| skip + slot * limit as u64)
                .take_while(|offset| total.map_or(true, |total| *offset < total))
                .map(|offset| self.query(collection, offset, limit))
                .collect();

            let started = Instant::now();
            let results = join_all(queries.iter().map(|q| ctx.source.fetch_page(q))).await;
            let latency = started.elapsed();

            let mut finished = false;
            let mut window = queries.iter().zip(results);
            while let Some((query, result)) = window.next() {
                skip = query.skip + limit as u64;

                match result {
                    Ok(page) => {
                        chunker.record_success(latency);
                        let received = page.received();
                        if total.is_none() {
                            total = page.total;
                        }
                        ingest(ctx, page, &defaults, outcome).await?;

                        if received < limit as u64 {
                            debug!(skip = query.skip, received, "Short page; collection done");
                            finished = true;
                            break;
                        }
                    }
                    Err(e) if e.is_unauthorized() => return Err(e.into()),
                    Err(e) => {
                        outcome.failed_units += 1;
                        contiguous = false;
                        warn!(skip = query.skip, limit, error = %e, "Chunk failed; skipping");

                        match chunker.record_failure(e.is_rate_limited()) {
                            FailureAction::Continue => {}
                            FailureAction::Pause(pause) => {
                                outcome.emergency_pauses += 1;
                                warn!(
                                    failures = chunker.consecutive_failures(),
                                    pause_ms = pause.as_millis() as u64,
                                    "Emergency pause"
                                );
                                sleep(pause).await;
                            }
                            FailureAction::Abort => {
                                let aborted = SyncError::CollectionAborted {
                                    collection: collection.to_string(),
                                    failures: chunker.consecutive_failures(),
                                };
                                warn!(error = %aborted, "Moving to next collection");
                                outcome.aborted_collections.push(collection.to_string());

                                // Pages of this window that did arrive are kept.
                                for (query, result) in window {
                                    match result {
                                        Ok(page) => ingest(ctx, page, &defaults, outcome).await?,
                                        Err(e) if e.is_unauthorized() => return Err(e.into()),
                                        Err(e) => {
                                            outcome.failed_units += 1;
                                            debug!(
                                                skip = query.skip,
                                                error = %e,
                                                "Chunk failed after abort"
                                            );
                                        }
                                    }
                                }
                                return Ok(());
                            }
                        }
                    }
                }
            }

            if resumable && contiguous && !finished {
                if let Err(e) = ctx.checkpoints.set_collection_offset(collection, skip).await {
                    warn!(error = %e, "Could not persist offset checkpoint");
                }
            }

            ctx.progress
                .report(outcome.fetched, grand_total, collection)
                .await;
            yielder.maybe_yield().await;

            if finished {
                break;
            }
        }

        if resumable {
            if let Err(e) = ctx.checkpoints.clear_collection_offset(collection).await {
                warn!(error = %e, "Could not clear offset checkpoint");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SyncStrategy for ChunkedStrategy {
    fn mode(&self) -> SyncMode {
        SyncMode::Chunked
    }

    #[instrument(skip(self, ctx), fields(session_id = %ctx.session_id))]
    async fn run(&self, ctx: &SessionContext) -> Result<StrategyOutcome> {
        let plans = ctx.plan_collections().await?;
        let grand_total = if self.since.is_some() {
            None
        } else {
            plans.iter().map(|p| p.total).sum::<Option<u64>>()
        };

        info!(
            collections = plans.len(),
            total = ?grand_total,
            incremental = self.since.is_some(),
            "Starting chunked enumeration"
        );

        let mut outcome = StrategyOutcome::default();
        let mut chunker = AdaptiveChunker::new(&ctx.settings);
        let mut yielder = ctx.yielder();

        for plan in &plans {
            self.walk_collection(
                ctx,
                plan,
                grand_total,
                &mut chunker,
                &mut outcome,
                &mut yielder,
            )
            .await?;
        }

        Ok(outcome)
    }
}
