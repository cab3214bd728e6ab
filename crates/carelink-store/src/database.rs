//! Database connection management.
//!
//! The [`Store`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. The store is synchronous;
//! callers that share it across tasks wrap it in `Arc<Mutex<_>>`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the default application database in the
    /// platform-appropriate data directory.
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "carelink", "carelink").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("carelink.db");

        tracing::info!(path = %db_path.display(), "opening store");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    ///
    /// Callers should prefer the typed helpers, but direct access is
    /// occasionally needed for transactions or ad-hoc queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_at_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let store = Store::open_at(&path).expect("should open");
        assert!(store.path().is_some());
    }

    #[test]
    fn test_migrations_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        drop(Store::open_at(&path).unwrap());
        Store::open_at(&path).expect("reopen should not fail");
    }
}
