//! Arbitrary string settings under a namespaced key prefix.

use rusqlite::params;

use crate::database::Store;
use crate::error::Result;

const PREFIX: &str = "settings.";

impl Store {
    pub fn get_setting(&self, name: &str) -> Result<Option<String>> {
        self.kv_get(&format!("{PREFIX}{name}"))
    }

    pub fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        self.kv_set(&format!("{PREFIX}{name}"), value)
    }

    /// All settings as `(name, value)` pairs, prefix stripped.
    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT key, value FROM kv WHERE key LIKE ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![format!("{PREFIX}%")], |row| {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            Ok((key, value))
        })?;

        let mut settings = Vec::new();
        for row in rows {
            let (key, value) = row?;
            settings.push((key[PREFIX.len()..].to_string(), value));
        }
        Ok(settings)
    }
}
