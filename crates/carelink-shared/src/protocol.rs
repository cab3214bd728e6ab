//! JSON wire protocol for the persistent socket transport.
//!
//! Every frame is a single JSON object tagged by `type`. Client requests
//! carry a `messageId` correlation token; the matching response echoes it.
//! The same server frame types arriving *without* a pending correlation
//! entry are treated as push events.

use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedEnvelope;
use crate::types::Channel;

/// Frames sent from the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    ChannelListRequest {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    ChannelCreate {
        #[serde(rename = "messageId")]
        message_id: String,
        channel: Channel,
    },
    ChannelUpdate {
        #[serde(rename = "messageId")]
        message_id: String,
        channel: Channel,
    },
    ChannelDelete {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "channelId")]
        channel_id: String,
    },
    ChannelJoin {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "channelId")]
        channel_id: String,
    },
    ChannelLeave {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "channelId")]
        channel_id: String,
    },
    /// An outbound chat message, already passed through the encryption
    /// provider.
    Message { envelope: EncryptedEnvelope },
}

impl ClientFrame {
    /// The correlation token, if this frame type carries one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            ClientFrame::ChannelListRequest { message_id }
            | ClientFrame::ChannelCreate { message_id, .. }
            | ClientFrame::ChannelUpdate { message_id, .. }
            | ClientFrame::ChannelDelete { message_id, .. }
            | ClientFrame::ChannelJoin { message_id, .. }
            | ClientFrame::ChannelLeave { message_id, .. } => Some(message_id),
            ClientFrame::Message { .. } => None,
        }
    }

    /// Serialize to a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from the server: correlated responses and push events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ChannelListResponse {
        #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        channels: Vec<Channel>,
    },
    ChannelCreated {
        #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        channel: Channel,
    },
    ChannelUpdated {
        #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        channel: Channel,
    },
    ChannelDeleted {
        #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(rename = "channelId")]
        channel_id: String,
    },
    Error {
        #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        message: String,
    },
    /// An inbound chat message.
    Message { envelope: EncryptedEnvelope },
}

impl ServerFrame {
    /// The echoed correlation token, if present.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            ServerFrame::ChannelListResponse { message_id, .. }
            | ServerFrame::ChannelCreated { message_id, .. }
            | ServerFrame::ChannelUpdated { message_id, .. }
            | ServerFrame::ChannelDeleted { message_id, .. }
            | ServerFrame::Error { message_id, .. } => message_id.as_deref(),
            ServerFrame::Message { .. } => None,
        }
    }

    /// Deserialize from a single JSON line.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelKind;
    use chrono::Utc;

    fn sample_channel() -> Channel {
        Channel {
            id: "ward-7-1700000000".into(),
            name: "Ward 7".into(),
            description: String::new(),
            kind: ChannelKind::Private,
            readonly: false,
            created_at: Utc::now(),
            members: None,
        }
    }

    #[test]
    fn test_request_field_names() {
        let frame = ClientFrame::ChannelListRequest {
            message_id: "abc-123".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "channel_list_request");
        assert_eq!(json["messageId"], "abc-123");
    }

    #[test]
    fn test_response_roundtrip() {
        let frame = ServerFrame::ChannelCreated {
            message_id: Some("id-1".into()),
            channel: sample_channel(),
        };
        let line = serde_json::to_string(&frame).unwrap();
        let restored = ServerFrame::from_json(&line).unwrap();
        assert_eq!(frame, restored);
        assert_eq!(restored.message_id(), Some("id-1"));
    }

    #[test]
    fn test_push_without_message_id() {
        let line = r#"{"type":"channel_deleted","channelId":"ward-7-1"}"#;
        let frame = ServerFrame::from_json(line).unwrap();
        assert_eq!(frame.message_id(), None);
        match frame {
            ServerFrame::ChannelDeleted { channel_id, .. } => {
                assert_eq!(channel_id, "ward-7-1");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_delete_frame_shape() {
        let frame = ClientFrame::ChannelDelete {
            message_id: "m-9".into(),
            channel_id: "ward-7-1700000000".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "channel_delete");
        assert_eq!(json["channelId"], "ward-7-1700000000");
    }
}
