use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{CHANNEL_ANNOUNCEMENTS, CHANNEL_GENERAL};

/// Role attached to a user account. Unknown roles fail to deserialize and
/// therefore grant nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

/// An authenticated user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Public,
    Private,
}

/// A conversation channel. The locally cached channel list is the
/// authoritative view for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    /// Stable channel id. System channels use the well-known ids
    /// `general` / `announcements`; user-created channels derive theirs
    /// from the name and creation time.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ChannelKind,
    #[serde(default)]
    pub readonly: bool,
    pub created_at: DateTime<Utc>,
    /// Member user ids. Lazily populated; `None` means unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
}

impl Channel {
    pub fn is_system(&self) -> bool {
        is_system_channel(&self.id)
    }
}

/// Whether an id names one of the non-deletable system channels.
pub fn is_system_channel(id: &str) -> bool {
    id == CHANNEL_GENERAL || id == CHANNEL_ANNOUNCEMENTS
}

/// Derive a stable channel id from a name and creation time.
pub fn channel_id_for(name: &str, created_at: DateTime<Utc>) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-');
    format!("{}-{}", slug, created_at.timestamp())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    System,
}

/// A chat message in the clear. The routing fields (`id`, `sender`,
/// `recipient`, `channel`, `timestamp`, `type`) are exactly the ones the
/// encryption envelope preserves in cleartext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
}

/// Connection state of the persistent socket transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}
