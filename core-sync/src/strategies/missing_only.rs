use super::{ingest, RecordDefaults, SessionContext, StrategyOutcome, SyncStrategy};
use crate::session::SyncMode;
use crate::Result;
use async_trait::async_trait;
use tracing::{info, instrument, warn};

/// Lists remote ids and downloads only the ones absent locally.
///
/// Listed ids that already exist are marked seen as well, so a mirror sweep
/// after this strategy removes exactly the records the server no longer
/// lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingOnlyStrategy;

#[async_trait]
impl SyncStrategy for MissingOnlyStrategy {
    fn mode(&self) -> SyncMode {
        SyncMode::MissingOnly
    }

    #[instrument(skip(self, ctx), fields(session_id = %ctx.session_id))]
    async fn run(&self, ctx: &SessionContext) -> Result<StrategyOutcome> {
        let plans = ctx.plan_collections().await?;
        let grand_total = plans.iter().map(|p| p.total).sum::<Option<u64>>();
        let page_size = ctx.settings.id_page_size.max(1);
        let batch_size = ctx.settings.id_batch_size.max(1);

        let mut outcome = StrategyOutcome::default();
        let mut yielder = ctx.yielder();
        let mut listed_total = 0u64;

        for plan in &plans {
            let collection = plan.name.as_str();
            let mut missing: Vec<String> = Vec::new();
            let mut skip = 0u64;

            loop {
                let page = match ctx.source.list_ids(collection, skip, page_size).await {
                    Ok(page) => page,
                    Err(e) if e.is_unauthorized() => return Err(e.into()),
                    Err(e) => {
                        outcome.failed_units += 1;
                        warn!(collection, skip, error = %e, "Id listing failed");
                        break;
                    }
                };

                let listed = page.ids.len();
                let existing = ctx.store.existing_ids(&page.ids).await?;
                let (present, absent): (Vec<String>, Vec<String>) = page
                    .ids
                    .into_iter()
                    .partition(|id| existing.contains(id));

                ctx.store.mark_seen(&present).await?;
                missing.extend(absent);

                skip += listed as u64;
                listed_total += listed as u64;
                ctx.progress.report(listed_total, grand_total, collection).await;
                yielder.maybe_yield().await;

                if listed < page_size {
                    break;
                }
            }

            info!(collection, listed = skip, missing = missing.len(), "Computed missing ids");

            let defaults = RecordDefaults::collection(collection);
            for batch in missing.chunks(batch_size) {
                match ctx.source.fetch_by_ids(collection, batch).await {
                    Ok(page) => ingest(ctx, page, &defaults, &mut outcome).await?,
                    Err(e) if e.is_unauthorized() => return Err(e.into()),
                    Err(e) => {
                        outcome.failed_units += 1;
                        warn!(collection, ids = batch.len(), error = %e, "Fetch by ids failed");
                    }
                }
                yielder.maybe_yield().await;
            }
        }

        Ok(outcome)
    }
}
