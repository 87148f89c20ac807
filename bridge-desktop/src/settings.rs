//! Settings Storage using SQLite
//!
//! Backs the sync checkpoints (`sync.last_sync_at`, `sync.file_meta.*`,
//! `sync.offset.*`) on desktop hosts. Each row remembers whether it was
//! written as text or as an integer; reading it back as the other kind is an
//! error rather than a silent reinterpretation.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('text', 'integer')),
        updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    )
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Integer,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Text => "text",
            Kind::Integer => "integer",
        }
    }
}

fn db_error(action: &str, key: &str, e: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(format!("{} '{}': {}", action, key, e))
}

/// SQLite-backed [`SettingsStore`].
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (or create) the settings database at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes, including on Windows.
        let url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid settings path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| db_error("open", &url, e))?;

        Self::with_pool(pool).await
    }

    /// Non-persistent store pinned to one connection, since every
    /// `sqlite::memory:` connection is a separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| db_error("open", "sqlite::memory:", e))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| db_error("create table", "settings", e))?;
        debug!("Settings store ready");
        Ok(Self { pool })
    }

    async fn put(&self, key: &str, value: &str, kind: Kind) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, kind, updated_at)
            VALUES (?, ?, ?, strftime('%s', 'now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                kind = excluded.kind,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("write", key, e))?;
        Ok(())
    }

    async fn fetch(&self, key: &str, expected: Kind) -> Result<Option<String>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT value, kind FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("read", key, e))?;

        match row {
            Some((value, kind)) if kind == expected.as_str() => Ok(Some(value)),
            Some((_, kind)) => {
                warn!(key, expected = expected.as_str(), actual = %kind, "Setting kind mismatch");
                Err(BridgeError::OperationFailed(format!(
                    "Setting '{}' holds {}, not {}",
                    key,
                    kind,
                    expected.as_str()
                )))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value, Kind::Text).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.fetch(key, Kind::Text).await
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.put(key, &value.to_string(), Kind::Integer).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.fetch(key, Kind::Integer).await? else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|e| {
            BridgeError::OperationFailed(format!("Setting '{}' is not an integer: {}", key, e))
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete", key, e))?;
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read", key, e))?;
        Ok(row.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list", "settings", e))?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}
