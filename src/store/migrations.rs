//! Usage: Credential store schema migrations (user_version + incremental upgrades).

use crate::shared::error::AppResult;
use rusqlite::Connection;

const LATEST_SCHEMA_VERSION: i64 = 1;

pub(super) fn apply_migrations(conn: &mut Connection) -> AppResult<()> {
    let user_version = read_user_version(conn)?;

    if user_version > LATEST_SCHEMA_VERSION {
        return Err(format!(
            "unsupported store schema version: user_version={user_version} (expected 0..={LATEST_SCHEMA_VERSION})"
        )
        .into());
    }

    if user_version == 0 {
        create_baseline_v1(conn)?;
        tracing::info!(to_version = LATEST_SCHEMA_VERSION, "credential store schema created");
    }

    Ok(())
}

fn create_baseline_v1(conn: &mut Connection) -> AppResult<()> {
    let tx = conn
        .transaction()
        .map_err(|e| format!("failed to start store transaction: {e}"))?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS credentials (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#,
    )
    .map_err(|e| format!("failed to create credentials table: {e}"))?;
    set_user_version(&tx, LATEST_SCHEMA_VERSION)?;
    tx.commit()
        .map_err(|e| format!("failed to commit store transaction: {e}"))?;
    Ok(())
}

fn read_user_version(conn: &Connection) -> AppResult<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| format!("failed to read store user_version: {e}").into())
}

fn set_user_version(tx: &rusqlite::Transaction<'_>, version: i64) -> AppResult<()> {
    tx.pragma_update(None, "user_version", version)
        .map_err(|e| format!("failed to update store user_version: {e}"))?;
    Ok(())
}
