use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Store error: {0}")]
    Store(#[from] core_store::StoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("A sync session is running; {operation} is not allowed until it finishes")]
    SyncInProgress { operation: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
