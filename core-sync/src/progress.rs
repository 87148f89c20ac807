//! # Progress Reporting
//!
//! Strategies report raw counters through a [`ProgressSink`]; the
//! [`ProgressReporter`] throttles them and fans them out to the session
//! `watch` channel and the event bus.
//!
//! An update passes the throttle only when at least `progress_min_interval`
//! has elapsed since the last emitted one AND the percentage moved by at
//! least `progress_min_delta` points. With an unknown total only the
//! interval applies. The first update of a session and the terminal update
//! always pass.

use crate::session::{ProgressSnapshot, SessionState};
use async_trait::async_trait;
use core_async::sync::{watch, Mutex};
use core_async::time::{Duration, Instant};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;

#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Records handled so far, the expected total when known, and the
    /// current unit of work.
    async fn report(&self, processed: u64, total: Option<u64>, phase: &str);
}

// ============================================================================
// Throttle
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_interval: Duration,
    min_delta: f64,
    last: Option<(Instant, f64)>,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration, min_delta: f64) -> Self {
        Self {
            min_interval,
            min_delta,
            last: None,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.progress_min_interval, settings.progress_min_delta)
    }

    /// Whether `snapshot` should be published at `now`; records it if so.
    pub fn should_emit(&mut self, snapshot: &ProgressSnapshot, now: Instant) -> bool {
        let Some((at, percentage)) = self.last else {
            self.last = Some((now, snapshot.percentage));
            return true;
        };

        let waited = now.saturating_duration_since(at) >= self.min_interval;
        let moved = snapshot.total.is_none()
            || (snapshot.percentage - percentage).abs() >= self.min_delta;

        if waited && moved {
            self.last = Some((now, snapshot.percentage));
            return true;
        }
        false
    }

    /// Record an unconditional emission.
    pub fn force(&mut self, snapshot: &ProgressSnapshot, now: Instant) {
        self.last = Some((now, snapshot.percentage));
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Throttled publisher for one session.
pub struct ProgressReporter {
    session_id: String,
    state: Arc<watch::Sender<SessionState>>,
    event_bus: EventBus,
    throttle: Mutex<ProgressThrottle>,
}

impl ProgressReporter {
    pub fn new(
        session_id: impl Into<String>,
        state: Arc<watch::Sender<SessionState>>,
        event_bus: EventBus,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            event_bus,
            throttle: Mutex::new(ProgressThrottle::from_settings(settings)),
        }
    }

    /// Publish bypassing the throttle, for the terminal update.
    pub async fn finish(&self, processed: u64, total: Option<u64>, phase: &str) {
        let snapshot = ProgressSnapshot::new(processed, total);
        self.throttle.lock().await.force(&snapshot, Instant::now());
        self.publish(snapshot, phase);
    }

    fn publish(&self, snapshot: ProgressSnapshot, phase: &str) {
        self.state.send_modify(|state| {
            state.progress = snapshot;
            state.phase = phase.to_string();
        });

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                session_id: self.session_id.clone(),
                processed: snapshot.processed,
                total: snapshot.total,
                percent: snapshot.percentage.round().clamp(0.0, 100.0) as u8,
                phase: phase.to_string(),
            }))
            .ok();
    }
}

#[async_trait]
impl ProgressSink for ProgressReporter {
    async fn report(&self, processed: u64, total: Option<u64>, phase: &str) {
        let snapshot = ProgressSnapshot::new(processed, total);
        let emit = self
            .throttle
            .lock()
            .await
            .should_emit(&snapshot, Instant::now());
        if emit {
            self.publish(snapshot, phase);
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Observer of the latest session state. Dropping it unsubscribes.
pub struct ProgressSubscription {
    receiver: watch::Receiver<SessionState>,
}

impl ProgressSubscription {
    pub(crate) fn new(receiver: watch::Receiver<SessionState>) -> Self {
        Self { receiver }
    }

    pub fn current(&self) -> SessionState {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published state. Returns `None` once the
    /// orchestrator is gone.
    pub async fn next(&mut self) -> Option<SessionState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}
