use super::{ingest, RecordDefaults, SessionContext, StrategyOutcome, SyncStrategy};
use crate::session::SyncMode;
use crate::Result;
use async_trait::async_trait;
use tracing::{info, instrument};

/// The whole dataset in one response, or one response per filtered
/// collection. Any failure fails the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkStrategy;

#[async_trait]
impl SyncStrategy for BulkStrategy {
    fn mode(&self) -> SyncMode {
        SyncMode::Bulk
    }

    #[instrument(skip(self, ctx), fields(session_id = %ctx.session_id))]
    async fn run(&self, ctx: &SessionContext) -> Result<StrategyOutcome> {
        let mut outcome = StrategyOutcome::default();

        let Some(collections) = &ctx.collections else {
            let page = ctx.source.fetch_bulk(None).await?;
            let total = page.total.unwrap_or(page.received());
            info!(records = page.received(), "Bulk dump received");

            ingest(ctx, page, &RecordDefaults::default(), &mut outcome).await?;
            ctx.progress.report(outcome.fetched, Some(total), "bulk").await;
            return Ok(outcome);
        };

        for collection in collections {
            let page = ctx.source.fetch_bulk(Some(collection)).await?;
            info!(collection = %collection, records = page.received(), "Bulk dump received");

            ingest(ctx, page, &RecordDefaults::collection(collection), &mut outcome).await?;
            ctx.progress.report(outcome.fetched, None, collection).await;
        }
        Ok(outcome)
    }
}
