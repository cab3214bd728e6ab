//! Channel synchronization: a locally cached channel list reconciled
//! against the server, with socket-first writes and REST fallback.
//!
//! Reads never fail: when the socket is down or a list request times out,
//! the caller gets the cache. Writes are attempted over the socket first;
//! a transport failure (not a server rejection) falls back to REST. Server
//! push events flow through [`ChannelService::apply_event`] and are applied
//! idempotently in receipt order, last write wins.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use carelink_shared::constants::{
    CHANNEL_GENERAL, READ_REQUEST_TIMEOUT, WRITE_REQUEST_TIMEOUT,
};
use carelink_shared::protocol::{ClientFrame, ServerFrame};
use carelink_shared::types::{
    channel_id_for, is_system_channel, Channel, ChannelKind, LinkStatus,
};
use carelink_shared::{OpError, OpResult};
use carelink_store::models::AuditCategory;
use carelink_store::Store;
use carelink_transport::rest::ChannelApi;
use carelink_transport::ChannelLink;

use crate::events::{ChannelListeners, ListenerId};
use crate::map_transport;
use crate::permissions;
use crate::session::SessionView;

/// Input for creating a channel.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub description: String,
    pub kind: ChannelKind,
}

/// Partial channel update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

struct ChannelState {
    cache: Vec<Channel>,
    active: String,
}

/// Maintains the channel cache and performs channel operations.
pub struct ChannelService<L, R, S> {
    link: L,
    rest: R,
    session: S,
    store: Arc<Mutex<Store>>,
    state: Arc<Mutex<ChannelState>>,
    listeners: Arc<ChannelListeners>,
}

impl<L, R, S> ChannelService<L, R, S>
where
    L: ChannelLink,
    R: ChannelApi,
    S: SessionView,
{
    /// Build the service, loading the cache from the store and seeding the
    /// system channels on first run.
    pub fn new(link: L, rest: R, session: S, store: Arc<Mutex<Store>>) -> Self {
        let (cache, active) = {
            let guard = store.lock().unwrap();
            let mut cache = guard.load_channels().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load channel cache");
                Vec::new()
            });
            if cache.is_empty() {
                cache = seed_system_channels();
                if let Err(e) = guard.save_channels(&cache) {
                    warn!(error = %e, "Failed to persist seeded channels");
                }
            }
            let active = guard
                .active_channel()
                .ok()
                .flatten()
                .unwrap_or_else(|| CHANNEL_GENERAL.to_string());
            (cache, active)
        };

        Self {
            link,
            rest,
            session,
            store,
            state: Arc::new(Mutex::new(ChannelState { cache, active })),
            listeners: Arc::new(ChannelListeners::new()),
        }
    }

    /// The channel list. Never fails: asks the server when connected and
    /// authenticated, otherwise (or on any transport problem) returns the
    /// cache.
    pub async fn get_available_channels(&self) -> Vec<Channel> {
        if !self.session.is_authenticated() || self.link.status() != LinkStatus::Connected {
            return self.cached();
        }

        let frame = ClientFrame::ChannelListRequest {
            message_id: new_message_id(),
        };
        match self.link.request(frame, READ_REQUEST_TIMEOUT).await {
            Ok(ServerFrame::ChannelListResponse { channels, .. }) => {
                self.replace_cache(channels.clone());
                channels
            }
            Ok(other) => {
                debug!(?other, "Unexpected channel list response, serving cache");
                self.cached()
            }
            Err(e) => {
                debug!(error = %e, "Channel list request failed, serving cache");
                self.cached()
            }
        }
    }

    pub async fn create_channel(&self, req: NewChannel) -> OpResult<Channel> {
        let user = self.session.current_user().ok_or(OpError::NotAuthenticated)?;
        if !self.session.has_permission(permissions::CHANNEL_CREATE) {
            return Err(OpError::PermissionDenied);
        }
        let name = req.name.trim();
        if name.is_empty() {
            return Err(OpError::Validation("Channel name is required".to_string()));
        }
        if self.link.status() != LinkStatus::Connected {
            return Err(OpError::NotConnected);
        }

        let created_at = Utc::now();
        let channel = Channel {
            id: channel_id_for(name, created_at),
            name: name.to_string(),
            description: req.description.trim().to_string(),
            kind: req.kind,
            readonly: false,
            created_at,
            members: Some(vec![user.id.clone()]),
        };

        let frame = ClientFrame::ChannelCreate {
            message_id: new_message_id(),
            channel: channel.clone(),
        };
        let confirmed = match self.link.request(frame, WRITE_REQUEST_TIMEOUT).await {
            Ok(ServerFrame::ChannelCreated { channel, .. }) => channel,
            Ok(ServerFrame::Error { message, .. }) => return Err(OpError::Transport(message)),
            Ok(other) => {
                return Err(OpError::Transport(format!(
                    "unexpected response: {other:?}"
                )))
            }
            Err(e) => {
                warn!(error = %e, "Socket channel create failed, falling back to REST");
                let token = self.session.token().ok_or(OpError::NotAuthenticated)?;
                self.rest
                    .create_channel(&token, &channel)
                    .await
                    .map_err(map_transport)?
            }
        };

        self.upsert(confirmed.clone());
        self.audit("channel_create", &confirmed.id, &user.username);
        info!(channel = %confirmed.id, "Channel created");
        Ok(confirmed)
    }

    pub async fn update_channel(&self, id: &str, update: ChannelUpdate) -> OpResult<Channel> {
        let user = self.session.current_user().ok_or(OpError::NotAuthenticated)?;
        if !self.session.has_permission(permissions::CHANNEL_UPDATE) {
            return Err(OpError::PermissionDenied);
        }

        let existing = self
            .state
            .lock()
            .unwrap()
            .cache
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(OpError::NotFound)?;

        // System channels keep their names; descriptions may change.
        if let Some(name) = &update.name {
            if is_system_channel(id) && name.trim() != existing.name {
                return Err(OpError::SystemChannel);
            }
            if name.trim().is_empty() {
                return Err(OpError::Validation("Channel name is required".to_string()));
            }
        }
        if self.link.status() != LinkStatus::Connected {
            return Err(OpError::NotConnected);
        }

        let mut channel = existing;
        if let Some(name) = update.name {
            channel.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            channel.description = description.trim().to_string();
        }

        let frame = ClientFrame::ChannelUpdate {
            message_id: new_message_id(),
            channel: channel.clone(),
        };
        let confirmed = match self.link.request(frame, WRITE_REQUEST_TIMEOUT).await {
            Ok(ServerFrame::ChannelUpdated { channel, .. }) => channel,
            Ok(ServerFrame::Error { message, .. }) => return Err(OpError::Transport(message)),
            Ok(other) => {
                return Err(OpError::Transport(format!(
                    "unexpected response: {other:?}"
                )))
            }
            Err(e) => {
                warn!(error = %e, "Socket channel update failed, falling back to REST");
                let token = self.session.token().ok_or(OpError::NotAuthenticated)?;
                self.rest
                    .update_channel(&token, &channel)
                    .await
                    .map_err(map_transport)?
            }
        };

        self.upsert(confirmed.clone());
        self.audit("channel_update", &confirmed.id, &user.username);
        Ok(confirmed)
    }

    /// Delete a channel. System channels are refused for every role.
    pub async fn delete_channel(&self, id: &str) -> OpResult<()> {
        let user = self.session.current_user().ok_or(OpError::NotAuthenticated)?;
        if is_system_channel(id) {
            return Err(OpError::SystemChannel);
        }
        if !self.session.has_permission(permissions::CHANNEL_DELETE) {
            return Err(OpError::PermissionDenied);
        }
        if self.link.status() != LinkStatus::Connected {
            return Err(OpError::NotConnected);
        }

        let frame = ClientFrame::ChannelDelete {
            message_id: new_message_id(),
            channel_id: id.to_string(),
        };
        match self.link.request(frame, WRITE_REQUEST_TIMEOUT).await {
            Ok(ServerFrame::ChannelDeleted { .. }) => {}
            Ok(ServerFrame::Error { message, .. }) => return Err(OpError::Transport(message)),
            Ok(other) => {
                return Err(OpError::Transport(format!(
                    "unexpected response: {other:?}"
                )))
            }
            Err(e) => {
                warn!(error = %e, "Socket channel delete failed, falling back to REST");
                let token = self.session.token().ok_or(OpError::NotAuthenticated)?;
                self.rest
                    .delete_channel(&token, id)
                    .await
                    .map_err(map_transport)?;
            }
        }

        self.remove(id);
        self.audit("channel_delete", id, &user.username);
        info!(channel = %id, "Channel deleted");
        Ok(())
    }

    /// Join a channel and make it the active one. The join itself is a
    /// fire-and-acknowledge send; activation is local.
    pub async fn join_channel(&self, id: &str) -> OpResult<()> {
        if !self.session.is_authenticated() {
            return Err(OpError::NotAuthenticated);
        }
        let known = self
            .state
            .lock()
            .unwrap()
            .cache
            .iter()
            .any(|c| c.id == id);
        if !known {
            return Err(OpError::NotFound);
        }

        if self.link.status() == LinkStatus::Connected {
            let frame = ClientFrame::ChannelJoin {
                message_id: new_message_id(),
                channel_id: id.to_string(),
            };
            if let Err(e) = self.link.send(frame).await {
                debug!(error = %e, "Join notification not delivered");
            }
        }

        self.set_active(id.to_string());
        Ok(())
    }

    /// Leave a channel. Leaving a system channel is refused; leaving the
    /// active channel falls back to `general`.
    pub async fn leave_channel(&self, id: &str) -> OpResult<()> {
        if !self.session.is_authenticated() {
            return Err(OpError::NotAuthenticated);
        }
        if is_system_channel(id) {
            return Err(OpError::SystemChannel);
        }

        if self.link.status() == LinkStatus::Connected {
            let frame = ClientFrame::ChannelLeave {
                message_id: new_message_id(),
                channel_id: id.to_string(),
            };
            if let Err(e) = self.link.send(frame).await {
                debug!(error = %e, "Leave notification not delivered");
            }
        }

        let active = self.state.lock().unwrap().active.clone();
        if active == id {
            self.set_active(CHANNEL_GENERAL.to_string());
        }
        Ok(())
    }

    /// Apply a server push event to the cache. Safe to call with the same
    /// event more than once.
    pub fn apply_event(&self, frame: &ServerFrame) {
        match frame {
            ServerFrame::ChannelListResponse { channels, .. } => {
                self.replace_cache(channels.clone());
            }
            ServerFrame::ChannelCreated { channel, .. } => {
                self.upsert(channel.clone());
            }
            ServerFrame::ChannelUpdated { channel, .. } => {
                // An update for an id we never saw is stale, not a create.
                let known = self
                    .state
                    .lock()
                    .unwrap()
                    .cache
                    .iter()
                    .any(|c| c.id == channel.id);
                if known {
                    self.upsert(channel.clone());
                } else {
                    debug!(channel = %channel.id, "Dropping update for unknown channel");
                }
            }
            ServerFrame::ChannelDeleted { channel_id, .. } => {
                self.remove(channel_id);
            }
            other => {
                debug!(?other, "Ignoring non-channel frame");
            }
        }
    }

    /// Register a channel list listener. It receives the current snapshot
    /// asynchronously right after registration, then every change.
    pub fn add_channel_listener(
        &self,
        listener: impl Fn(&[Channel]) + Send + Sync + 'static,
    ) -> ListenerId {
        let listener: Arc<dyn Fn(&[Channel]) + Send + Sync> = Arc::new(listener);
        let id = self.listeners.add(listener.clone());
        let snapshot = self.cached();
        tokio::spawn(async move {
            listener(&snapshot);
        });
        id
    }

    pub fn remove_channel_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn active_channel(&self) -> String {
        self.state.lock().unwrap().active.clone()
    }

    fn cached(&self) -> Vec<Channel> {
        self.state.lock().unwrap().cache.clone()
    }

    fn replace_cache(&self, channels: Vec<Channel>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.cache == channels {
                return;
            }
            state.cache = channels;
        }
        self.persist_and_notify();
    }

    /// Insert or overwrite by id. Last write wins.
    fn upsert(&self, channel: Channel) {
        {
            let mut state = self.state.lock().unwrap();
            match state.cache.iter_mut().find(|c| c.id == channel.id) {
                Some(existing) => {
                    if *existing == channel {
                        return;
                    }
                    *existing = channel;
                }
                None => state.cache.push(channel),
            }
        }
        self.persist_and_notify();
    }

    fn remove(&self, id: &str) {
        let removed = {
            let mut state = self.state.lock().unwrap();
            let before = state.cache.len();
            state.cache.retain(|c| c.id != id);
            state.cache.len() != before
        };
        if !removed {
            return;
        }
        if self.active_channel() == id {
            self.set_active(CHANNEL_GENERAL.to_string());
        }
        self.persist_and_notify();
    }

    fn set_active(&self, id: String) {
        self.state.lock().unwrap().active = id.clone();
        let store = self.store.lock().unwrap();
        if let Err(e) = store.set_active_channel(&id) {
            warn!(error = %e, "Failed to persist active channel");
        }
    }

    fn persist_and_notify(&self) {
        let snapshot = self.cached();
        {
            let store = self.store.lock().unwrap();
            if let Err(e) = store.save_channels(&snapshot) {
                warn!(error = %e, "Failed to persist channel cache");
            }
        }
        self.listeners.emit(&snapshot);
    }

    fn audit(&self, action: &str, channel_id: &str, username: &str) {
        let store = self.store.lock().unwrap();
        let _ = store.audit(
            AuditCategory::Channel,
            action,
            json!({ "channel": channel_id, "username": username }),
        );
    }
}

/// The two channels every deployment has.
fn seed_system_channels() -> Vec<Channel> {
    let created_at = Utc::now();
    vec![
        Channel {
            id: CHANNEL_GENERAL.to_string(),
            name: "General".to_string(),
            description: "Hospital-wide discussion".to_string(),
            kind: ChannelKind::Public,
            readonly: false,
            created_at,
            members: None,
        },
        Channel {
            id: carelink_shared::constants::CHANNEL_ANNOUNCEMENTS.to_string(),
            name: "Announcements".to_string(),
            description: "Official announcements, read-only".to_string(),
            kind: ChannelKind::Public,
            readonly: true,
            created_at,
            members: None,
        },
    ]
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
