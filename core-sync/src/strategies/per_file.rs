use super::{ingest, RecordDefaults, SessionContext, StrategyOutcome, SyncStrategy};
use crate::file_meta::{FileMeta, FileState};
use crate::session::SyncMode;
use crate::Result;
use async_trait::async_trait;
use core_transport::RemoteFile;
use tracing::{debug, info, instrument, warn};

/// Resumable download of server-side upload files.
///
/// Each session fetches at most one page per incomplete file, continuing
/// from the stored [`FileMeta`]. Completed files are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerFileStrategy;

impl PerFileStrategy {
    async fn discover_files(
        &self,
        ctx: &SessionContext,
        outcome: &mut StrategyOutcome,
    ) -> Result<Vec<RemoteFile>> {
        let limit = ctx.settings.file_list_page_size.max(1);
        let mut files = Vec::new();
        let mut page = 1u64;

        loop {
            let listing = match ctx.source.list_files(page, limit).await {
                Ok(listing) => listing,
                Err(e) if e.is_unauthorized() || files.is_empty() => return Err(e.into()),
                Err(e) => {
                    outcome.failed_units += 1;
                    warn!(page, error = %e, "File listing failed; using files found so far");
                    break;
                }
            };

            let more = listing.has_more(limit);
            files.extend(listing.files);
            if !more {
                break;
            }
            page += 1;
        }

        Ok(files)
    }

    async fn load_meta(&self, ctx: &SessionContext, file: &RemoteFile) -> FileMeta {
        let stored = match ctx.checkpoints.file_meta(&file.name).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(file = %file.name, error = %e, "Could not read file checkpoint");
                None
            }
        };

        match stored {
            Some(mut meta) => {
                if meta.total == 0 {
                    meta.total = file.total_records;
                }
                meta
            }
            None => FileMeta::discovered(file, ctx.settings.file_page_size.max(1)),
        }
    }
}

#[async_trait]
impl SyncStrategy for PerFileStrategy {
    fn mode(&self) -> SyncMode {
        SyncMode::PerFile
    }

    #[instrument(skip(self, ctx), fields(session_id = %ctx.session_id))]
    async fn run(&self, ctx: &SessionContext) -> Result<StrategyOutcome> {
        let mut outcome = StrategyOutcome::default();
        let files = self.discover_files(ctx, &mut outcome).await?;
        let grand_total: u64 = files.iter().map(|f| f.total_records).sum();
        info!(files = files.len(), total = grand_total, "Discovered upload files");

        let mut yielder = ctx.yielder();
        let mut processed = 0u64;

        for file in &files {
            let mut meta = self.load_meta(ctx, file).await;

            if meta.completed {
                debug!(file = %meta.name, "File already completed");
                processed += meta.downloaded;
                continue;
            }

            if let Err(e) = meta.transition_to(FileState::Downloading) {
                outcome.failed_units += 1;
                warn!(file = %meta.name, error = %e, "Skipping file in unexpected state");
                continue;
            }

            let page = meta.next_page();
            let limit = meta.page_size;

            match ctx.source.fetch_file_page(&meta.name, page, limit).await {
                Ok(records) => {
                    let received = records.received();
                    if records.remote_updated_at.is_some() {
                        meta.remote_updated_at = records.remote_updated_at.clone();
                    }

                    let defaults = RecordDefaults {
                        collection: None,
                        category: meta.category.as_deref(),
                    };
                    ingest(ctx, records, &defaults, &mut outcome).await?;

                    meta.record_page(received, limit)?;
                    debug!(
                        file = %meta.name,
                        page,
                        downloaded = meta.downloaded,
                        status = %meta.status,
                        "File page ingested"
                    );

                    if let Err(e) = ctx.checkpoints.save_file_meta(&meta).await {
                        warn!(file = %meta.name, error = %e, "Could not persist file checkpoint");
                    }
                }
                Err(e) if e.is_unauthorized() => return Err(e.into()),
                Err(e) => {
                    outcome.failed_units += 1;
                    warn!(file = %meta.name, page, error = %e, "File page failed");
                }
            }

            processed += meta.downloaded;
            ctx.progress
                .report(processed, Some(grand_total), &meta.name)
                .await;
            yielder.maybe_yield().await;
        }

        Ok(outcome)
    }
}
