//! String key-value state. All higher-level persistence helpers
//! (session, channel cache, settings) are built on this table.

use rusqlite::{params, OptionalExtension};

use crate::database::Store;
use crate::error::Result;

impl Store {
    /// Read a value by key.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write (or overwrite) a value.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete a key. Returns `true` if a row was removed.
    pub fn kv_delete(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Store;

    #[test]
    fn test_kv_round_trip() {
        let store = Store::open_in_memory().unwrap();

        assert_eq!(store.kv_get("missing").unwrap(), None);

        store.kv_set("k", "v1").unwrap();
        assert_eq!(store.kv_get("k").unwrap().as_deref(), Some("v1"));

        store.kv_set("k", "v2").unwrap();
        assert_eq!(store.kv_get("k").unwrap().as_deref(), Some("v2"));

        assert!(store.kv_delete("k").unwrap());
        assert!(!store.kv_delete("k").unwrap());
        assert_eq!(store.kv_get("k").unwrap(), None);
    }
}
