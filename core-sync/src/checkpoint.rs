//! Sync checkpoints kept in the host's `SettingsStore`.
//!
//! | Key | Value |
//! |-----|-------|
//! | `sync.last_sync_at` | RFC 3339 start time of the last successful session |
//! | `sync.file_meta.<name>` | [`FileMeta`] as JSON |
//! | `sync.offset.<collection>` | next chunk offset of an interrupted enumeration |
//!
//! Unparseable values are logged and treated as absent so a corrupt entry
//! never blocks a session.

use crate::file_meta::FileMeta;
use crate::{Result, SyncError};
use bridge_traits::storage::SettingsStore;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub const LAST_SYNC_KEY: &str = "sync.last_sync_at";
pub const FILE_META_PREFIX: &str = "sync.file_meta.";
pub const OFFSET_PREFIX: &str = "sync.offset.";

#[derive(Clone)]
pub struct CheckpointStore {
    settings: Arc<dyn SettingsStore>,
}

impl CheckpointStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.get(LAST_SYNC_KEY).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unparseable last-sync timestamp");
                Ok(None)
            }
        }
    }

    pub async fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<()> {
        let value = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        debug!(last_sync_at = %value, "Persisting last-sync timestamp");
        self.set(LAST_SYNC_KEY, &value).await
    }

    pub async fn file_meta(&self, name: &str) -> Result<Option<FileMeta>> {
        let key = file_meta_key(name);
        let Some(raw) = self.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(file = %name, error = %e, "Ignoring corrupt file checkpoint");
                Ok(None)
            }
        }
    }

    pub async fn save_file_meta(&self, meta: &FileMeta) -> Result<()> {
        let json = serde_json::to_string(meta)
            .map_err(|e| SyncError::Checkpoint(format!("encode {}: {}", meta.name, e)))?;
        self.set(&file_meta_key(&meta.name), &json).await
    }

    pub async fn collection_offset(&self, collection: &str) -> Result<Option<u64>> {
        let key = offset_key(collection);
        let value = self
            .settings
            .get_i64(&key)
            .await
            .map_err(|e| SyncError::Checkpoint(format!("read {}: {}", key, e)))?;
        Ok(value.and_then(|offset| u64::try_from(offset).ok()))
    }

    pub async fn set_collection_offset(&self, collection: &str, offset: u64) -> Result<()> {
        let key = offset_key(collection);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        self.settings
            .set_i64(&key, offset)
            .await
            .map_err(|e| SyncError::Checkpoint(format!("write {}: {}", key, e)))
    }

    pub async fn clear_collection_offset(&self, collection: &str) -> Result<()> {
        let key = offset_key(collection);
        self.settings
            .delete(&key)
            .await
            .map_err(|e| SyncError::Checkpoint(format!("delete {}: {}", key, e)))
    }

    /// Forget every checkpoint, so the next session starts from scratch.
    pub async fn clear(&self) -> Result<usize> {
        let keys = self
            .settings
            .list_keys()
            .await
            .map_err(|e| SyncError::Checkpoint(format!("list keys: {}", e)))?;

        let mut removed = 0;
        for key in keys.iter().filter(|key| is_checkpoint_key(key)) {
            self.settings
                .delete(key)
                .await
                .map_err(|e| SyncError::Checkpoint(format!("delete {}: {}", key, e)))?;
            removed += 1;
        }
        debug!(removed, "Cleared sync checkpoints");
        Ok(removed)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.settings
            .get_string(key)
            .await
            .map_err(|e| SyncError::Checkpoint(format!("read {}: {}", key, e)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.settings
            .set_string(key, value)
            .await
            .map_err(|e| SyncError::Checkpoint(format!("write {}: {}", key, e)))
    }
}

fn file_meta_key(name: &str) -> String {
    format!("{}{}", FILE_META_PREFIX, name)
}

fn offset_key(collection: &str) -> String {
    format!("{}{}", OFFSET_PREFIX, collection)
}

fn is_checkpoint_key(key: &str) -> bool {
    key == LAST_SYNC_KEY || key.starts_with(FILE_META_PREFIX) || key.starts_with(OFFSET_PREFIX)
}
