//! Error types for the vehicle service transport

use bridge_traits::error::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Transport errors, classified by how the caller should react.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No response arrived within the request deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered 429
    #[error("Rate limited by server (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The server answered 5xx
    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// DNS failure, refused connection or reset
    #[error("Service unreachable: {0}")]
    Unreachable(String),

    /// Missing credential or 401/403 from the server
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other 4xx
    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The body could not be decoded into the expected envelope
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Every attempt allowed by the retry policy failed
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<TransportError>,
    },
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_)
                | TransportError::RateLimited { .. }
                | TransportError::Server { .. }
                | TransportError::Unreachable(_)
        )
    }

    /// Whether this error (or the last attempt behind it) was a 429.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            TransportError::RateLimited { .. } => true,
            TransportError::RetryExhausted { last, .. } => last.is_rate_limited(),
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }

    /// Server-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TransportError::RateLimited { retry_after } => *retry_after,
            TransportError::RetryExhausted { last, .. } => last.retry_after(),
            _ => None,
        }
    }

    /// Classify a non-2xx status.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => TransportError::RateLimited { retry_after },
            401 | 403 => TransportError::Unauthorized(format!("status {}: {}", status, message)),
            408 => TransportError::Timeout(format!("status 408: {}", message)),
            500..=599 => TransportError::Server { status, message },
            _ => TransportError::Rejected { status, message },
        }
    }
}

impl From<BridgeError> for TransportError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout(msg) => TransportError::Timeout(msg),
            BridgeError::Unreachable(msg) => TransportError::Unreachable(msg),
            BridgeError::Io(e) => TransportError::Unreachable(e.to_string()),
            other => TransportError::Unreachable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            TransportError::from_status(429, String::new(), Some(Duration::from_secs(2))),
            TransportError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(2)
        ));
        assert!(TransportError::from_status(401, String::new(), None).is_unauthorized());
        assert!(TransportError::from_status(403, String::new(), None).is_unauthorized());
        assert!(matches!(
            TransportError::from_status(503, "busy".into(), None),
            TransportError::Server { status: 503, .. }
        ));
        assert!(matches!(
            TransportError::from_status(404, "gone".into(), None),
            TransportError::Rejected { status: 404, .. }
        ));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(TransportError::Timeout("slow".into()).is_retryable());
        assert!(TransportError::Unreachable("dns".into()).is_retryable());
        assert!(TransportError::RateLimited { retry_after: None }.is_retryable());
        assert!(!TransportError::Unauthorized("no token".into()).is_retryable());
        assert!(!TransportError::Decode("bad json".into()).is_retryable());
        assert!(!TransportError::Rejected {
            status: 400,
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_keeps_last_cause() {
        let err = TransportError::RetryExhausted {
            attempts: 5,
            last: Box::new(TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(9)),
            }),
        };

        assert!(!err.is_retryable());
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(9)));
    }

    #[test]
    fn test_bridge_error_mapping() {
        let err: TransportError = BridgeError::Timeout("30s".into()).into();
        assert!(matches!(err, TransportError::Timeout(_)));

        let err: TransportError = BridgeError::Unreachable("refused".into()).into();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }
}
