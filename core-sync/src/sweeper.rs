//! # Consistency Sweeper
//!
//! Mark-and-sweep reconciliation for mirror sessions.
//!
//! ## Overview
//!
//! The seen set is cleared when a session begins and filled by every
//! ingestion. After the strategy finishes, a mirror session deletes each
//! local record whose id was not seen. The sweep is refused for modes that
//! do not enumerate the whole remote set.
//!
//! A session restricted to some collections only sweeps records stored
//! under those collections.
//!
//! An enumeration with failed units is still swept unless
//! `sweep_after_partial_failure` is off; records inside a failed chunk are
//! then deleted although the server still has them. The result is flagged
//! as partial.

use crate::session::SyncMode;
use crate::{Result, SyncError};
use core_store::VehicleStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub applied: bool,
    pub partial: bool,
    pub deleted: u64,
}

pub struct Sweeper {
    store: Arc<dyn VehicleStore>,
    sweep_after_partial_failure: bool,
}

impl Sweeper {
    pub fn new(store: Arc<dyn VehicleStore>, sweep_after_partial_failure: bool) -> Self {
        Self {
            store,
            sweep_after_partial_failure,
        }
    }

    /// Clear the seen set before a session ingests anything.
    pub async fn begin(&self) -> Result<()> {
        self.store.reset_seen().await?;
        Ok(())
    }

    /// Delete every local record not seen during the session, limited to
    /// `collections` when the session walked a subset.
    ///
    /// Returns `Consistency` when `mode` cannot support a mirror.
    #[instrument(skip(self))]
    pub async fn sweep(
        &self,
        mode: SyncMode,
        failed_units: u64,
        collections: Option<&[String]>,
    ) -> Result<SweepOutcome> {
        if !mode.supports_mirror() {
            return Err(SyncError::Consistency(format!(
                "{} sessions do not enumerate the full remote set; mirror sweep refused",
                mode
            )));
        }

        let partial = failed_units > 0;
        if partial && !self.sweep_after_partial_failure {
            warn!(failed_units, "Enumeration incomplete; skipping mirror sweep");
            return Ok(SweepOutcome {
                applied: false,
                partial,
                deleted: 0,
            });
        }
        if partial {
            warn!(
                failed_units,
                "Sweeping after an incomplete enumeration; records in failed units will be removed"
            );
        }

        let seen = self.store.seen_count().await?;
        let deleted = self.store.delete_not_seen(collections).await?;
        info!(seen, deleted, partial, "Mirror sweep finished");

        Ok(SweepOutcome {
            applied: true,
            partial,
            deleted,
        })
    }

    /// Discard the seen set once the session is over.
    pub async fn finish(&self) -> Result<()> {
        self.store.reset_seen().await?;
        Ok(())
    }
}
