//! Credential and Settings Storage Abstractions
//!
//! The sync core reads its bearer credential from a [`SecureStore`] and keeps
//! its resumable checkpoints (last sync timestamp, per-file offsets and
//! per-collection offsets) in a [`SettingsStore`]. Neither medium is owned by
//! the core.

use async_trait::async_trait;

use crate::error::Result;

/// Credential storage backed by the platform keychain.
///
/// Implementations must never log the stored values.
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("auth.bearer_token", token.as_bytes()).await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value for `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key succeeds.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}

/// Key-value store for sync checkpoints.
///
/// iOS hosts typically back it with UserDefaults, Android with DataStore and
/// desktop with a SQLite table.
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_checkpoint(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("sync.last_sync_at", "2024-05-01T10:00:00Z").await?;
///     store.set_i64("sync.offset.cars", 12_000).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// `Ok(None)` when the key is missing. A key written as a string is an
    /// error.
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn has_key(&self, key: &str) -> Result<bool>;

    async fn list_keys(&self) -> Result<Vec<String>>;
}
