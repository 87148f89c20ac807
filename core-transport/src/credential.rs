//! Bearer credential lookup.

use async_trait::async_trait;
use bridge_traits::storage::SecureStore;
use std::sync::Arc;

use crate::error::{Result, TransportError};

/// Secure-store key holding the service bearer token.
pub const BEARER_TOKEN_KEY: &str = "auth.bearer_token";

/// Supplies the bearer token attached to every request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fails with [`TransportError::Unauthorized`] when no usable token exists.
    async fn bearer_token(&self) -> Result<String>;
}

/// Reads the token from a [`SecureStore`] on each call, so a token replaced
/// by the host is picked up without restarting the session.
pub struct SecureStoreCredentials {
    store: Arc<dyn SecureStore>,
    key: String,
}

impl SecureStoreCredentials {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self::with_key(store, BEARER_TOKEN_KEY)
    }

    pub fn with_key(store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for SecureStoreCredentials {
    async fn bearer_token(&self) -> Result<String> {
        let secret = self
            .store
            .get_secret(&self.key)
            .await
            .map_err(|e| TransportError::Unauthorized(format!("credential lookup failed: {}", e)))?
            .ok_or_else(|| TransportError::Unauthorized("no credential stored".to_string()))?;

        let token = String::from_utf8(secret)
            .map_err(|_| TransportError::Unauthorized("stored credential is not UTF-8".to_string()))?;

        let token = token.trim();
        if token.is_empty() {
            return Err(TransportError::Unauthorized(
                "stored credential is empty".to_string(),
            ));
        }
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemorySecureStore;

    #[core_async::test]
    async fn test_reads_trimmed_token() {
        let store = MemorySecureStore::with_secret(BEARER_TOKEN_KEY, b"  abc.def \n");
        let credentials = SecureStoreCredentials::new(Arc::new(store));

        assert_eq!(credentials.bearer_token().await.unwrap(), "abc.def");
    }

    #[core_async::test]
    async fn test_missing_token_is_unauthorized() {
        let credentials = SecureStoreCredentials::new(Arc::new(MemorySecureStore::new()));

        let err = credentials.bearer_token().await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[core_async::test]
    async fn test_empty_token_is_unauthorized() {
        let store = MemorySecureStore::with_secret(BEARER_TOKEN_KEY, b"   ");
        let credentials = SecureStoreCredentials::new(Arc::new(store));

        assert!(credentials.bearer_token().await.unwrap_err().is_unauthorized());
    }
}
