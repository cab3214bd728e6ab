//! Domain model structs persisted by the store.

use carelink_shared::types::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit log category. Secret material (passwords, raw keys) is never
/// written to the detail payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Auth,
    Channel,
    Security,
    Admin,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Auth => "auth",
            AuditCategory::Channel => "channel",
            AuditCategory::Security => "security",
            AuditCategory::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auth" => Some(AuditCategory::Auth),
            "channel" => Some(AuditCategory::Channel),
            "security" => Some(AuditCategory::Security),
            "admin" => Some(AuditCategory::Admin),
            _ => None,
        }
    }
}

/// A single append-only audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub action: String,
    pub detail: serde_json::Value,
}

/// A user record in the local-fallback authentication list.
/// Passwords are stored as salted BLAKE3 hashes, never in the clear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUser {
    pub user: User,
    pub password_hash: String,
    pub salt: String,
}
