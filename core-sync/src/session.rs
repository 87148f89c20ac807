//! # Sync Session State Machine
//!
//! One sync session from start to its terminal result.
//!
//! ## Overview
//!
//! A session is owned by the orchestrator and never persisted. Its status
//! moves through validated transitions:
//!
//! ```text
//! Idle → Running → Sweeping → Completed
//!   ↓       ↓         ↓
//!   └───→ Failed ←────┘
//! ```
//!
//! Observers only ever see [`SessionState`] snapshots published by the
//! orchestrator.

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_async::time::Instant;
use core_store::IndexStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Mode & Request
// ============================================================================

/// Download policy of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Pick one of the concrete modes from stats and checkpoint state
    #[default]
    Auto,
    Bulk,
    Chunked,
    PerFile,
    MissingOnly,
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Auto => "auto",
            SyncMode::Bulk => "bulk",
            SyncMode::Chunked => "chunked",
            SyncMode::PerFile => "per_file",
            SyncMode::MissingOnly => "missing_only",
            SyncMode::Incremental => "incremental",
        }
    }

    /// Whether the mode enumerates the whole remote set, which a mirror
    /// sweep depends on.
    pub fn supports_mirror(&self) -> bool {
        matches!(
            self,
            SyncMode::Bulk | SyncMode::Chunked | SyncMode::MissingOnly
        )
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(SyncMode::Auto),
            "bulk" => Ok(SyncMode::Bulk),
            "chunked" => Ok(SyncMode::Chunked),
            "per_file" => Ok(SyncMode::PerFile),
            "missing_only" => Ok(SyncMode::MissingOnly),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(SyncError::Data(format!("Unknown sync mode: {}", other))),
        }
    }
}

/// Parameters of one `start()` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncRequest {
    pub mode: SyncMode,
    /// Delete local records missing from the enumeration; `None` uses the
    /// configured default.
    pub mirror: Option<bool>,
    /// Restrict the session to these collections; `None` uses the configured
    /// filter, or every collection the server reports.
    pub collections: Option<Vec<String>>,
}

impl SyncRequest {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = Some(collections.into_iter().map(Into::into).collect());
        self
    }
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Sweeping,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Sweeping => "sweeping",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Sweeping)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Progress, Stats & Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed: u64,
    /// Unknown until the strategy learns the remote size
    pub total: Option<u64>,
    /// 0.0 to 100.0; stays 0.0 while the total is unknown
    pub percentage: f64,
}

impl ProgressSnapshot {
    pub fn new(processed: u64, total: Option<u64>) -> Self {
        let percentage = match total {
            Some(0) => 100.0,
            Some(total) => (processed.min(total) as f64 / total as f64) * 100.0,
            None => 0.0,
        };
        Self {
            processed,
            total,
            percentage,
        }
    }
}

/// Counters accumulated over one session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// Concrete mode that ran (never `Auto` once resolved)
    pub mode: SyncMode,
    /// Elements received from the server, accepted or rejected
    pub fetched: u64,
    pub written: u64,
    pub unchanged: u64,
    pub rejected: u64,
    pub deleted: u64,
    /// Chunks, pages or batches that failed after retries
    pub failed_units: u64,
    pub aborted_collections: Vec<String>,
    pub emergency_pauses: u32,
    pub mirror_requested: bool,
    pub mirror_applied: bool,
    /// The sweep ran (or was skipped) over an incomplete enumeration
    pub mirror_partial: bool,
    pub duration_ms: u64,
    #[serde(skip)]
    pub index: Option<IndexStats>,
}

impl SyncStats {
    /// Every chunk, page and batch arrived; nothing has to be fetched again.
    pub fn is_complete(&self) -> bool {
        self.failed_units == 0 && self.aborted_collections.is_empty()
    }
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub session_id: String,
    pub success: bool,
    pub message: String,
    pub stats: SyncStats,
}

/// Return value of `SyncOrchestrator::start`.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    /// `false` when another session was already running
    pub started: bool,
    pub result: Option<SyncResult>,
}

impl StartOutcome {
    pub fn rejected() -> Self {
        Self {
            started: false,
            result: None,
        }
    }

    pub fn finished(result: SyncResult) -> Self {
        Self {
            started: true,
            result: Some(result),
        }
    }
}

/// Latest observable state, published to subscribers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub status: SessionStatus,
    pub mode: Option<SyncMode>,
    pub phase: String,
    pub progress: ProgressSnapshot,
    pub result: Option<SyncResult>,
}

impl SessionState {
    pub fn idle() -> Self {
        Self::default()
    }
}

// ============================================================================
// Session
// ============================================================================

/// The running session, owned exclusively by the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncSession {
    pub id: SessionId,
    /// Requested mode; replaced with the concrete mode once resolved
    pub mode: SyncMode,
    pub mirror: bool,
    pub status: SessionStatus,
    /// Wall-clock start, persisted as the next incremental boundary
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub progress: ProgressSnapshot,
    pub phase: String,
    pub result: Option<SyncResult>,
}

impl SyncSession {
    pub fn new(mode: SyncMode, mirror: bool) -> Self {
        Self {
            id: SessionId::new(),
            mode,
            mirror,
            status: SessionStatus::Idle,
            started_at: Utc::now(),
            started: Instant::now(),
            progress: ProgressSnapshot::default(),
            phase: String::new(),
            result: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(SessionStatus::Running)?;
        self.started_at = Utc::now();
        self.started = Instant::now();
        self.phase = "starting".to_string();
        Ok(())
    }

    pub fn resolve_mode(&mut self, mode: SyncMode) {
        self.mode = mode;
    }

    pub fn begin_sweep(&mut self) -> Result<()> {
        self.transition(SessionStatus::Sweeping)?;
        self.phase = "sweeping".to_string();
        Ok(())
    }

    pub fn update_progress(&mut self, progress: ProgressSnapshot, phase: impl Into<String>) {
        self.progress = progress;
        self.phase = phase.into();
    }

    pub fn complete(
        &mut self,
        mut stats: SyncStats,
        message: impl Into<String>,
    ) -> Result<SyncResult> {
        self.transition(SessionStatus::Completed)?;
        stats.duration_ms = self.elapsed_ms();
        Ok(self.finish(true, message.into(), stats))
    }

    pub fn fail(
        &mut self,
        mut stats: SyncStats,
        message: impl Into<String>,
    ) -> Result<SyncResult> {
        self.transition(SessionStatus::Failed)?;
        stats.duration_ms = self.elapsed_ms();
        Ok(self.finish(false, message.into(), stats))
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Snapshot for subscribers.
    pub fn state(&self) -> SessionState {
        SessionState {
            session_id: Some(self.id.to_string()),
            status: self.status,
            mode: Some(self.mode),
            phase: self.phase.clone(),
            progress: self.progress,
            result: self.result.clone(),
        }
    }

    fn finish(&mut self, success: bool, message: String, stats: SyncStats) -> SyncResult {
        self.phase = self.status.as_str().to_string();
        let result = SyncResult {
            session_id: self.id.to_string(),
            success,
            message,
            stats,
        };
        self.result = Some(result.clone());
        result
    }

    fn transition(&mut self, to: SessionStatus) -> Result<()> {
        self.validate_transition(to)?;
        self.status = to;
        Ok(())
    }

    fn validate_transition(&self, to: SessionStatus) -> Result<()> {
        let valid = match (self.status, to) {
            (SessionStatus::Idle, SessionStatus::Running) => true,
            (SessionStatus::Idle, SessionStatus::Failed) => true,

            (SessionStatus::Running, SessionStatus::Sweeping) => true,
            (SessionStatus::Running, SessionStatus::Completed) => true,
            (SessionStatus::Running, SessionStatus::Failed) => true,

            (SessionStatus::Sweeping, SessionStatus::Completed) => true,
            (SessionStatus::Sweeping, SessionStatus::Failed) => true,

            // Terminal states cannot transition
            (SessionStatus::Completed, _) => false,
            (SessionStatus::Failed, _) => false,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}
