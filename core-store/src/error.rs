use thiserror::Error;

/// SQLite result code for a full database or disk.
const SQLITE_FULL: &str = "13";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Storage capacity exhausted: {0}")]
    Capacity(String),

    #[error("Invalid record {id}: {message}")]
    InvalidRecord { id: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, StoreError::Capacity(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        let is_full = error
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code == SQLITE_FULL)
            .unwrap_or(false);

        if is_full {
            StoreError::Capacity(error.to_string())
        } else {
            StoreError::Database(error)
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
