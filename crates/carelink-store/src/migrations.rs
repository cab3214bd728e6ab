//! Schema migrations, versioned through `PRAGMA user_version`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

const CURRENT_VERSION: i64 = 2;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database version {version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if version < 1 {
        v001_initial(conn)?;
    }
    if version < 2 {
        v002_audit_log(conn)?;
    }

    conn.pragma_update(None, "user_version", CURRENT_VERSION)?;
    Ok(())
}

/// v1: key-value state and the local-fallback user list.
fn v001_initial(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
             key   TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS local_users (
             username      TEXT PRIMARY KEY,
             user_json     TEXT NOT NULL,
             password_hash TEXT NOT NULL,
             salt          TEXT NOT NULL
         );",
    )?;
    tracing::debug!("migration v001 applied");
    Ok(())
}

/// v2: append-only audit log.
fn v002_audit_log(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_log (
             id       INTEGER PRIMARY KEY AUTOINCREMENT,
             ts       TEXT NOT NULL,
             category TEXT NOT NULL,
             action   TEXT NOT NULL,
             detail   TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_audit_ts ON audit_log (ts);",
    )?;
    tracing::debug!("migration v002 applied");
    Ok(())
}
