//! Append-only audit log with retention trimming and CSV export.
//!
//! Every append prunes entries past the retention window and beyond the
//! entry cap, so the table never grows unbounded. Detail payloads are
//! scrubbed of known secret keys before they are written.

use carelink_shared::constants::{AUDIT_MAX_ENTRIES, AUDIT_RETENTION_DAYS};
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use crate::database::Store;
use crate::error::Result;
use crate::models::{AuditCategory, AuditEntry};

/// Detail keys that must never reach the log.
const SECRET_KEYS: &[&str] = &["password", "token", "key", "secret"];

/// Drop secret-bearing fields from a detail payload.
fn scrub(detail: serde_json::Value) -> serde_json::Value {
    match detail {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(k, _)| !SECRET_KEYS.contains(&k.as_str()))
                .collect(),
        ),
        other => other,
    }
}

impl Store {
    /// Append an audit entry, then trim the log to the retention window and
    /// entry cap.
    pub fn audit(
        &self,
        category: AuditCategory,
        action: &str,
        detail: serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT INTO audit_log (ts, category, action, detail) VALUES (?1, ?2, ?3, ?4)",
            params![
                now.to_rfc3339(),
                category.as_str(),
                action,
                scrub(detail).to_string(),
            ],
        )?;

        let cutoff = now - Duration::days(AUDIT_RETENTION_DAYS);
        self.conn().execute(
            "DELETE FROM audit_log WHERE ts < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        self.conn().execute(
            "DELETE FROM audit_log WHERE id NOT IN
                 (SELECT id FROM audit_log ORDER BY id DESC LIMIT ?1)",
            params![AUDIT_MAX_ENTRIES as i64],
        )?;
        Ok(())
    }

    /// Most recent entries, newest first.
    pub fn audit_entries(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, ts, category, action, detail
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let ts: String = row.get(1)?;
            let category: String = row.get(2)?;
            let action: String = row.get(3)?;
            let detail: String = row.get(4)?;
            Ok((id, ts, category, action, detail))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, ts, category, action, detail) = row?;
            entries.push(AuditEntry {
                id,
                timestamp: DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc),
                category: AuditCategory::parse(&category).unwrap_or(AuditCategory::Security),
                action,
                detail: serde_json::from_str(&detail)?,
            });
        }
        Ok(entries)
    }

    /// Export the full log as CSV, oldest first.
    pub fn audit_export_csv(&self) -> Result<String> {
        let mut stmt = self.conn().prepare(
            "SELECT id, ts, category, action, detail FROM audit_log ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let ts: String = row.get(1)?;
            let category: String = row.get(2)?;
            let action: String = row.get(3)?;
            let detail: String = row.get(4)?;
            Ok((id, ts, category, action, detail))
        })?;

        let mut csv = String::from("id,timestamp,category,action,detail\n");
        for row in rows {
            let (id, ts, category, action, detail) = row?;
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                id,
                csv_field(&ts),
                csv_field(&category),
                csv_field(&action),
                csv_field(&detail),
            ));
        }
        Ok(csv)
    }
}

/// Quote a CSV field when needed, doubling embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_and_list() {
        let store = Store::open_in_memory().unwrap();
        store
            .audit(AuditCategory::Auth, "login", json!({"username": "iris"}))
            .unwrap();
        store
            .audit(AuditCategory::Channel, "create", json!({"id": "ward-7"}))
            .unwrap();

        let entries = store.audit_entries(10).unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].action, "create");
        assert_eq!(entries[1].category, AuditCategory::Auth);
    }

    #[test]
    fn test_secrets_scrubbed() {
        let store = Store::open_in_memory().unwrap();
        store
            .audit(
                AuditCategory::Auth,
                "login",
                json!({"username": "iris", "password": "s3cret", "token": "tok"}),
            )
            .unwrap();

        let entries = store.audit_entries(1).unwrap();
        assert_eq!(entries[0].detail["username"], "iris");
        assert!(entries[0].detail.get("password").is_none());
        assert!(entries[0].detail.get("token").is_none());
    }

    #[test]
    fn test_cap_enforced() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..(AUDIT_MAX_ENTRIES + 25) {
            store
                .audit(AuditCategory::Channel, "update", json!({"n": i}))
                .unwrap();
        }

        let entries = store.audit_entries(AUDIT_MAX_ENTRIES * 2).unwrap();
        assert_eq!(entries.len(), AUDIT_MAX_ENTRIES);
        // Oldest entries were trimmed.
        assert_eq!(entries.last().unwrap().detail["n"], 25);
    }

    #[test]
    fn test_csv_export_escapes_fields() {
        let store = Store::open_in_memory().unwrap();
        store
            .audit(
                AuditCategory::Admin,
                "note, with comma",
                json!({"reason": "said \"no\""}),
            )
            .unwrap();

        let csv = store.audit_export_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "id,timestamp,category,action,detail");
        let line = lines.next().unwrap();
        assert!(line.contains("\"note, with comma\""));
        assert!(line.contains("\"\"no\"\""));
    }

    #[test]
    fn test_csv_field_plain_passthrough() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
    }
}
