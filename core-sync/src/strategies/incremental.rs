use super::{ChunkedStrategy, SessionContext, StrategyOutcome, SyncStrategy};
use crate::session::SyncMode;
use crate::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Pages of records changed since the last successful session.
///
/// Without a stored timestamp this is a full chunked enumeration.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementalStrategy;

#[async_trait]
impl SyncStrategy for IncrementalStrategy {
    fn mode(&self) -> SyncMode {
        SyncMode::Incremental
    }

    async fn run(&self, ctx: &SessionContext) -> Result<StrategyOutcome> {
        let last_sync = match ctx.checkpoints.last_sync_at().await {
            Ok(last_sync) => last_sync,
            Err(e) => {
                warn!(error = %e, "Could not read last-sync timestamp");
                None
            }
        };

        match last_sync {
            Some(since) => {
                info!(since = %since, "Fetching records changed since last sync");
                ChunkedStrategy::since(since).run(ctx).await
            }
            None => {
                info!("No previous sync recorded; enumerating everything");
                ChunkedStrategy::new().run(ctx).await
            }
        }
    }
}
