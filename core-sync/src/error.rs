use core_store::StoreError;
use core_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid record data: {0}")]
    Data(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Local storage is full: {0}")]
    Capacity(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Collection {collection} aborted after {failures} consecutive failures")]
    CollectionAborted { collection: String, failures: u32 },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl SyncError {
    /// Whether a later session may succeed without intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Transport(e) => {
                e.is_retryable() || matches!(e, TransportError::RetryExhausted { .. })
            }
            SyncError::Auth(_) | SyncError::Capacity(_) => false,
            SyncError::InvalidStateTransition { .. } => false,
            _ => true,
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(error: TransportError) -> Self {
        if error.is_unauthorized() {
            return SyncError::Auth(error.to_string());
        }
        SyncError::Transport(error)
    }
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        if error.is_capacity() {
            return SyncError::Capacity(error.to_string());
        }
        SyncError::Store(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_transport_error_becomes_auth() {
        let error: SyncError = TransportError::Unauthorized("expired".into()).into();
        assert!(matches!(error, SyncError::Auth(_)));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_retry_exhausted_is_recoverable() {
        let error: SyncError = TransportError::RetryExhausted {
            attempts: 3,
            last: Box::new(TransportError::Timeout("slow".into())),
        }
        .into();
        assert!(matches!(error, SyncError::Transport(_)));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_capacity_store_error_maps_to_capacity() {
        let error: SyncError = StoreError::Capacity("disk full".into()).into();
        assert!(matches!(error, SyncError::Capacity(_)));
    }
}
