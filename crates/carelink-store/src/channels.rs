//! Persistence of the channel cache and the active-channel pointer.

use carelink_shared::types::Channel;

use crate::database::Store;
use crate::error::Result;

const KEY_CACHE: &str = "channels.cache";
const KEY_ACTIVE: &str = "channels.active";

impl Store {
    /// Persist the full channel cache as a JSON blob.
    pub fn save_channels(&self, channels: &[Channel]) -> Result<()> {
        self.kv_set(KEY_CACHE, &serde_json::to_string(channels)?)
    }

    /// Load the persisted channel cache. Empty when never saved.
    pub fn load_channels(&self) -> Result<Vec<Channel>> {
        match self.kv_get(KEY_CACHE)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Persist the active-channel id.
    pub fn set_active_channel(&self, id: &str) -> Result<()> {
        self.kv_set(KEY_ACTIVE, id)
    }

    /// The persisted active-channel id, if any.
    pub fn active_channel(&self) -> Result<Option<String>> {
        self.kv_get(KEY_ACTIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_shared::types::ChannelKind;
    use chrono::Utc;

    fn channel(id: &str) -> Channel {
        Channel {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            kind: ChannelKind::Public,
            readonly: false,
            created_at: Utc::now(),
            members: None,
        }
    }

    #[test]
    fn test_channel_cache_round_trip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_channels().unwrap().is_empty());

        let channels = vec![channel("general"), channel("ward-7-1")];
        store.save_channels(&channels).unwrap();
        assert_eq!(store.load_channels().unwrap(), channels);
    }

    #[test]
    fn test_active_channel_pointer() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.active_channel().unwrap(), None);

        store.set_active_channel("ward-7-1").unwrap();
        assert_eq!(store.active_channel().unwrap().as_deref(), Some("ward-7-1"));
    }
}
