//! # Per-File Download State
//!
//! Resumable progress for one server-side upload file.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Downloading → PartialDownloaded → Completed
//!               ↑               │
//!               └───────────────┘
//! ```
//!
//! `Downloading → Completed` is allowed directly for files that fit in one
//! page. `Completed` is terminal, and re-entering it is a no-op.

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_transport::RemoteFile;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    #[default]
    Pending,
    Downloading,
    PartialDownloaded,
    Completed,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Pending => "pending",
            FileState::Downloading => "downloading",
            FileState::PartialDownloaded => "partial_downloaded",
            FileState::Completed => "completed",
        }
    }

    pub fn can_transition_to(&self, to: FileState) -> bool {
        matches!(
            (self, to),
            (FileState::Pending, FileState::Downloading)
                | (FileState::Downloading, FileState::PartialDownloaded)
                | (FileState::Downloading, FileState::Completed)
                | (FileState::PartialDownloaded, FileState::Downloading)
                | (FileState::Completed, FileState::Completed)
        )
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub category: Option<String>,
    /// Record count declared by the listing; 0 when undeclared
    pub total: u64,
    /// Records received so far, clamped to `total` on completion
    pub downloaded: u64,
    /// Records consumed from the start of the file; only advances
    pub last_offset: u64,
    pub completed: bool,
    pub remote_updated_at: Option<String>,
    pub local_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: FileState,
    /// Page size `last_offset` was recorded with
    pub page_size: usize,
}

impl FileMeta {
    pub fn discovered(file: &RemoteFile, page_size: usize) -> Self {
        Self {
            name: file.name.clone(),
            category: file.category.clone(),
            total: file.total_records,
            downloaded: 0,
            last_offset: 0,
            completed: false,
            remote_updated_at: file.updated_at.clone(),
            local_updated_at: None,
            status: FileState::Pending,
            page_size,
        }
    }

    /// 1-based page that continues from `last_offset`.
    pub fn next_page(&self) -> u64 {
        self.last_offset / self.page_size.max(1) as u64 + 1
    }

    pub fn transition_to(&mut self, to: FileState) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("File {} cannot move from {} to {}", self.name, self.status, to),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Apply one successfully ingested page and settle the resulting state.
    ///
    /// Must be called while `Downloading`.
    pub fn record_page(&mut self, received: u64, requested: usize) -> Result<()> {
        let requested = requested as u64;
        let downloaded = self.downloaded + received;
        let short_page = received < requested;
        let done = short_page || (self.total > 0 && downloaded >= self.total);

        self.transition_to(if done {
            FileState::Completed
        } else {
            FileState::PartialDownloaded
        })?;

        self.downloaded = downloaded;
        self.last_offset += received.min(requested);
        self.local_updated_at = Some(Utc::now());
        if done {
            self.completed = true;
            if self.total > 0 {
                self.downloaded = self.downloaded.min(self.total);
            }
        }
        Ok(())
    }
}
