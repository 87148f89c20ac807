//! In-process secure store for headless hosts and tests.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// [`SecureStore`] kept in process memory.
///
/// Secrets do not survive a restart. Used where no OS keychain is available
/// (CI, containers) and as the default credential store in tests.
#[derive(Default)]
pub struct MemorySecureStore {
    secrets: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor seeding a single secret.
    pub fn with_secret(key: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        let store = Self::default();
        if let Ok(mut secrets) = store.secrets.lock() {
            secrets.insert(key.into(), value.as_ref().to_vec());
        }
        store
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.secrets
            .lock()
            .map_err(|_| BridgeError::OperationFailed("Secure store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
