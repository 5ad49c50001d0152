//! Usage: SQLite-backed credential store (fixed-key value table + lifecycle helpers).

mod migrations;

use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Historical key spelling, preserved so existing stores keep resolving.
pub const KEY_ACCESS_TOKEN: &str = "acessToken";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const KEY_USER: &str = "user";

const BUSY_TIMEOUT: Duration = Duration::from_millis(2000);
const POOL_MAX_SIZE: u32 = 4;
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Credential material persisted after login or a successful refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user: serde_json::Value,
}

#[derive(Clone)]
pub struct CredentialStore {
    pool: Pool<SqliteConnectionManager>,
}

impl CredentialStore {
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let path_hint = path.to_string_lossy().to_string();

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            configure_connection(conn)
        });

        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(|e| format!("STORE_INIT: failed to create store pool: {e}"))?;

        let mut conn = pool
            .get()
            .map_err(|e| format!("STORE_INIT: failed to get startup connection: {e}"))?;
        migrations::apply_migrations(&mut conn)
            .map_err(|e| format!("STORE_INIT: migration failed at {path_hint}: {e}"))?;

        Ok(Self { pool })
    }

    fn open_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| format!("STORE_READ: failed to get connection from pool: {e}").into())
    }

    pub fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.open_connection()?;
        conn.query_row(
            "SELECT value FROM credentials WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("STORE_READ: failed to read key={key}: {e}").into())
    }

    pub fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.open_connection()?;
        conn.execute(
            "INSERT INTO credentials(key, value, updated_at) VALUES(?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_unix_seconds()],
        )
        .map_err(|e| format!("STORE_WRITE: failed to write key={key}: {e}"))?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> AppResult<bool> {
        let conn = self.open_connection()?;
        let changed = conn
            .execute("DELETE FROM credentials WHERE key = ?1", params![key])
            .map_err(|e| format!("STORE_WRITE: failed to delete key={key}: {e}"))?;
        Ok(changed > 0)
    }

    /// Persist a full credential pair, overwriting any prior values.
    pub fn save_credentials(&self, credentials: &CredentialPair) -> AppResult<()> {
        let user_raw = serde_json::to_string(&credentials.user)
            .map_err(|e| format!("STORE_WRITE: failed to serialize user record: {e}"))?;
        self.set(KEY_ACCESS_TOKEN, &credentials.access_token)?;
        self.set(KEY_REFRESH_TOKEN, &credentials.refresh_token)?;
        self.set(KEY_USER, &user_raw)?;
        Ok(())
    }

    pub fn access_token(&self) -> AppResult<Option<String>> {
        Ok(normalize_optional_text(self.get(KEY_ACCESS_TOKEN)?.as_deref()))
    }

    pub fn refresh_token(&self) -> AppResult<Option<String>> {
        Ok(normalize_optional_text(self.get(KEY_REFRESH_TOKEN)?.as_deref()))
    }

    /// The opaque user record saved alongside the tokens, if any.
    pub fn user(&self) -> AppResult<Option<serde_json::Value>> {
        match self.get(KEY_USER)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str::<serde_json::Value>(&raw)
                .map(Some)
                .map_err(|e| format!("STORE_READ: stored user record is not valid json: {e}").into()),
        }
    }
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA synchronous = NORMAL;
"#,
    )
}
