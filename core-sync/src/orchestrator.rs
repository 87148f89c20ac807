//! # Sync Orchestrator
//!
//! Single-flight coordinator for sync sessions.
//!
//! ## Overview
//!
//! [`SyncOrchestrator::start`] runs exactly one strategy per call:
//!
//! 1. Claim the running flag, or return `started: false` immediately
//! 2. Clear the seen set and resolve `Auto` into a concrete mode
//! 3. Run the strategy, reporting throttled progress
//! 4. Sweep unseen records when mirroring was requested
//! 5. Rebuild the search index; persist the last-sync time only when every
//!    unit was fetched
//! 6. Publish the terminal [`SyncResult`] exactly once
//!
//! Every error is converted into a failed result; `start` never returns an
//! error and never leaves a session unresolved.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = Arc::new(SyncOrchestrator::new(source, store, settings_store, sync, bus));
//! let mut progress = orchestrator.subscribe();
//!
//! let outcome = orchestrator.start(SyncRequest::new(SyncMode::Auto).mirror(true)).await;
//! assert!(outcome.started);
//! ```

use crate::checkpoint::CheckpointStore;
use crate::progress::{ProgressReporter, ProgressSubscription};
use crate::session::{
    ProgressSnapshot, SessionState, StartOutcome, SyncMode, SyncRequest, SyncResult, SyncSession,
    SyncStats,
};
use crate::strategies::{strategy_for, SessionContext};
use crate::sweeper::Sweeper;
use crate::{Result, SyncError};
use bridge_traits::storage::SettingsStore;
use core_async::sync::watch;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use core_store::{IndexStats, VehicleStore};
use core_transport::{CollectionStats, RecordSource};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Releases the running flag when the session ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pick the concrete mode for an `Auto` request.
pub fn auto_mode(has_last_sync: bool, mirror: bool, total: u64, bulk_threshold: u64) -> SyncMode {
    if has_last_sync && !mirror {
        SyncMode::Incremental
    } else if total < bulk_threshold {
        SyncMode::Bulk
    } else {
        SyncMode::Chunked
    }
}

pub struct SyncOrchestrator {
    source: Arc<dyn RecordSource>,
    store: Arc<dyn VehicleStore>,
    checkpoints: CheckpointStore,
    settings: SyncSettings,
    event_bus: EventBus,
    running: AtomicBool,
    state: Arc<watch::Sender<SessionState>>,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn VehicleStore>,
        settings_store: Arc<dyn SettingsStore>,
        settings: SyncSettings,
        event_bus: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::idle());
        Self {
            source,
            store,
            checkpoints: CheckpointStore::new(settings_store),
            settings,
            event_bus,
            running: AtomicBool::new(false),
            state: Arc::new(state),
        }
    }

    /// Latest-state stream; the current value is available immediately.
    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription::new(self.state.subscribe())
    }

    pub fn current_state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run one session to completion, unless one is already running.
    #[instrument(skip(self, request), fields(mode = %request.mode))]
    pub async fn start(&self, request: SyncRequest) -> StartOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            info!("Sync already in progress; start request ignored");
            return StartOutcome::rejected();
        };

        StartOutcome::finished(self.run_session(request).await)
    }

    /// Run `work` while holding the running flag, so no session can start
    /// until it finishes. Returns `None` when a session is already running.
    pub async fn exclusive<F, Fut, T>(&self, work: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = RunningGuard::acquire(&self.running)?;
        Some(work().await)
    }

    async fn run_session(&self, request: SyncRequest) -> SyncResult {
        let mirror = request.mirror.unwrap_or(self.settings.mirror_by_default);
        let collections = request
            .collections
            .clone()
            .or_else(|| self.settings.collections.clone());

        let mut session = SyncSession::new(request.mode, mirror);
        let session_id = session.id.to_string();
        let reporter = Arc::new(ProgressReporter::new(
            session_id.clone(),
            self.state.clone(),
            self.event_bus.clone(),
            &self.settings,
        ));
        let sweeper = Sweeper::new(self.store.clone(), self.settings.sweep_after_partial_failure);

        let mut stats = SyncStats {
            mode: request.mode,
            mirror_requested: mirror,
            ..SyncStats::default()
        };

        let outcome = self
            .execute(
                &mut session,
                &mut stats,
                collections,
                reporter.clone(),
                &sweeper,
            )
            .await;

        if let Err(e) = sweeper.finish().await {
            warn!(error = %e, "Could not discard seen set");
        }
        stats.index = self.rebuild_index().await;

        let progress = self.state.borrow().progress;
        let processed = progress.processed.max(stats.fetched);
        let terminal_phase = if outcome.is_ok() { "completed" } else { "failed" };
        reporter.finish(processed, progress.total, terminal_phase).await;
        session.update_progress(ProgressSnapshot::new(processed, progress.total), terminal_phase);

        let result = match outcome {
            Ok(()) => {
                if stats.is_complete() {
                    if let Err(e) = self.checkpoints.set_last_sync_at(session.started_at).await {
                        warn!(error = %e, "Could not persist last-sync timestamp");
                    }
                } else {
                    // Records in skipped units must be fetched again next time.
                    warn!(
                        failed_units = stats.failed_units,
                        aborted = stats.aborted_collections.len(),
                        "Enumeration incomplete; last-sync timestamp left unchanged"
                    );
                }
                let message = format!(
                    "Synced {} records: {} written, {} unchanged, {} deleted, {} failed units",
                    stats.fetched, stats.written, stats.unchanged, stats.deleted, stats.failed_units
                );
                info!(session_id = %session_id, %message, "Sync completed");
                session.complete(stats, message)
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Sync failed");
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        session_id: session_id.clone(),
                        message: e.to_string(),
                        processed,
                        recoverable: e.is_recoverable(),
                    }))
                    .ok();
                session.fail(stats, e.to_string())
            }
        };

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Session ended in an invalid state");
                SyncResult {
                    session_id: session_id.clone(),
                    success: false,
                    message: e.to_string(),
                    stats: SyncStats::default(),
                }
            }
        };

        if result.success {
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::Completed {
                    session_id,
                    records_written: result.stats.written,
                    records_unchanged: result.stats.unchanged,
                    records_deleted: result.stats.deleted,
                    failed_units: result.stats.failed_units,
                    duration_secs: result.stats.duration_ms / 1_000,
                }))
                .ok();
        }

        self.publish(&session);
        result
    }

    async fn execute(
        &self,
        session: &mut SyncSession,
        stats: &mut SyncStats,
        collections: Option<Vec<String>>,
        progress: Arc<ProgressReporter>,
        sweeper: &Sweeper,
    ) -> Result<()> {
        session.start()?;
        self.publish(session);

        sweeper.begin().await?;

        let (mode, known_stats) = self
            .resolve_mode(session.mode, session.mirror, collections.as_deref())
            .await?;
        session.resolve_mode(mode);
        stats.mode = mode;
        self.publish(session);

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                session_id: session.id.to_string(),
                mode: mode.as_str().to_string(),
                mirror: session.mirror,
            }))
            .ok();
        info!(session_id = %session.id, mode = %mode, mirror = session.mirror, "Sync started");

        let ctx = SessionContext {
            session_id: session.id.to_string(),
            source: self.source.clone(),
            store: self.store.clone(),
            checkpoints: self.checkpoints.clone(),
            progress,
            settings: self.settings.clone(),
            mirror: session.mirror,
            collections,
            known_stats,
        };

        let outcome = strategy_for(mode).run(&ctx).await?;
        stats.fetched = outcome.fetched;
        stats.written = outcome.written;
        stats.unchanged = outcome.unchanged;
        stats.rejected = outcome.rejected;
        stats.failed_units = outcome.failed_units;
        stats.aborted_collections = outcome.aborted_collections;
        stats.emergency_pauses = outcome.emergency_pauses;

        if session.mirror {
            session.begin_sweep()?;
            self.publish(session);

            match sweeper
                .sweep(mode, stats.failed_units, ctx.collections.as_deref())
                .await
            {
                Ok(sweep) => {
                    stats.deleted = sweep.deleted;
                    stats.mirror_applied = sweep.applied;
                    stats.mirror_partial = sweep.partial;
                    if sweep.applied {
                        self.event_bus
                            .emit(CoreEvent::Sync(SyncEvent::SweepCompleted {
                                session_id: session.id.to_string(),
                                deleted: sweep.deleted,
                                partial: sweep.partial,
                            }))
                            .ok();
                    }
                }
                Err(e @ SyncError::Consistency(_)) => {
                    warn!(error = %e, "Mirror sweep refused; ingested records kept");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn resolve_mode(
        &self,
        requested: SyncMode,
        mirror: bool,
        collections: Option<&[String]>,
    ) -> Result<(SyncMode, Option<Vec<CollectionStats>>)> {
        if requested != SyncMode::Auto {
            return Ok((requested, None));
        }

        let has_last_sync = match self.checkpoints.last_sync_at().await {
            Ok(last_sync) => last_sync.is_some(),
            Err(e) => {
                warn!(error = %e, "Could not read last-sync timestamp");
                false
            }
        };
        if has_last_sync && !mirror {
            return Ok((SyncMode::Incremental, None));
        }

        let stats = self.source.stats().await?;
        let total: u64 = stats
            .iter()
            .filter(|s| collections.map_or(true, |names| names.contains(&s.name)))
            .map(|s| s.count)
            .sum();

        let mode = auto_mode(has_last_sync, mirror, total, self.settings.bulk_threshold);
        info!(total, mode = %mode, "Selected sync mode");
        Ok((mode, Some(stats)))
    }

    async fn rebuild_index(&self) -> Option<IndexStats> {
        match self.store.rebuild_index().await {
            Ok(index) => {
                self.event_bus
                    .emit(CoreEvent::Library(LibraryEvent::IndexRebuilt {
                        records: index.records,
                        suffix_keys: index.suffix_keys,
                        chassis_buckets: index.chassis_buckets,
                    }))
                    .ok();
                Some(index)
            }
            Err(e) => {
                warn!(error = %e, "Search index rebuild failed; lookups fall back to table scans");
                None
            }
        }
    }

    fn publish(&self, session: &SyncSession) {
        let mut snapshot = session.state();
        self.state.send_modify(|state| {
            // The reporter owns progress while the strategy runs.
            if session.status.is_active() && state.session_id == snapshot.session_id {
                snapshot.progress = state.progress;
            }
            *state = snapshot;
        });
    }
}
