//! # Sync Module
//!
//! Pulls vehicle records from the remote service into the local store.
//!
//! ## Overview
//!
//! This module manages the lifecycle of sync sessions, including:
//! - Choosing a download strategy from remote stats and checkpoints
//! - Paging, batching and resuming downloads under an adaptive request budget
//! - Upserting records and tracking which ids a session observed
//! - Deleting vanished records when a mirror is requested
//! - Rebuilding the search index after each session
//!
//! ## Components
//!
//! - **Session State Machine** (`session`): session lifecycle with validated transitions
//! - **Strategies** (`strategies`): bulk, chunked, per-file, missing-only and incremental engines
//! - **File State** (`file_meta`): resumable per-file progress
//! - **Checkpoints** (`checkpoint`): last-sync time, file progress and offsets in the settings store
//! - **Progress** (`progress`): throttled publication of session progress
//! - **Sweeper** (`sweeper`): mark-and-sweep reconciliation for mirror sessions
//! - **Orchestrator** (`orchestrator`): single-flight entry point

pub mod checkpoint;
pub mod error;
pub mod file_meta;
pub mod orchestrator;
pub mod progress;
pub mod session;
pub mod strategies;
pub mod sweeper;

pub use checkpoint::CheckpointStore;
pub use error::{Result, SyncError};
pub use file_meta::{FileMeta, FileState};
pub use orchestrator::{auto_mode, SyncOrchestrator};
pub use progress::{ProgressReporter, ProgressSink, ProgressSubscription, ProgressThrottle};
pub use session::{
    ProgressSnapshot, SessionId, SessionState, SessionStatus, StartOutcome, SyncMode,
    SyncRequest, SyncResult, SyncSession, SyncStats,
};
pub use strategies::{
    strategy_for, AdaptiveChunker, CollectionPlan, FailureAction, SessionContext,
    StrategyOutcome, SyncStrategy,
};
pub use sweeper::{SweepOutcome, Sweeper};
