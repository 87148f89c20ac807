use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The request did not complete within its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The remote host could not be reached (DNS, connect, reset).
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
