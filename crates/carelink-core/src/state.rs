//! Wiring of the whole core: one [`CoreContext`] owns every service.
//!
//! The embedding application calls [`CoreContext::start`] once, hands the
//! returned event receiver to [`CoreContext::spawn_bridge`], and then talks
//! to the services through the context.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use carelink_shared::crypto::EncryptionProvider;
use carelink_shared::OpResult;
use carelink_store::{Result as StoreResult, Store};
use carelink_transport::rest::RestClient;
use carelink_transport::socket::{spawn_socket, LinkEvent, SocketConfig, SocketHandle};

use crate::admin::AdminService;
use crate::bridge::run_bridge;
use crate::channels::ChannelService;
use crate::config::CoreConfig;
use crate::events::LogoutReason;
use crate::notify::{NotificationDispatcher, NotificationSink};
use crate::session::SessionManager;

type SharedSession = Arc<SessionManager<RestClient>>;

/// The fully wired client core.
pub struct CoreContext<N> {
    pub config: CoreConfig,
    pub store: Arc<Mutex<Store>>,
    pub session: SharedSession,
    pub channels: Arc<ChannelService<SocketHandle, RestClient, SharedSession>>,
    pub admin: Arc<AdminService<RestClient, SharedSession>>,
    pub notifications: Arc<NotificationDispatcher<N>>,
    pub crypto: Arc<Mutex<EncryptionProvider>>,
    socket: SocketHandle,
}

impl<N: NotificationSink + 'static> CoreContext<N> {
    /// Open the on-disk store and wire everything up. Must be called from
    /// within a tokio runtime; the socket task starts immediately.
    pub fn start(
        config: CoreConfig,
        sink: N,
    ) -> StoreResult<(Self, mpsc::Receiver<LinkEvent>)> {
        let store = Arc::new(Mutex::new(Store::new()?));
        Ok(Self::start_with_store(config, sink, store))
    }

    /// Wire everything up against an already opened store.
    pub fn start_with_store(
        config: CoreConfig,
        sink: N,
        store: Arc<Mutex<Store>>,
    ) -> (Self, mpsc::Receiver<LinkEvent>) {
        let rest = RestClient::new(&config.server_url);
        let (socket, events) = spawn_socket(SocketConfig::new(&config.socket_addr));

        let session: SharedSession = Arc::new(SessionManager::new(
            rest.clone(),
            store.clone(),
            config.clone(),
        ));
        session.restore();

        let channels = Arc::new(ChannelService::new(
            socket.clone(),
            rest.clone(),
            session.clone(),
            store.clone(),
        ));
        let admin = Arc::new(AdminService::new(rest, session.clone(), store.clone()));
        let notifications = Arc::new(NotificationDispatcher::new(sink));
        let crypto = Arc::new(Mutex::new(EncryptionProvider::new()));

        let context = Self {
            config,
            store,
            session,
            channels,
            admin,
            notifications,
            crypto,
            socket,
        };
        (context, events)
    }

    /// Spawn the event bridge on the receiver returned by `start`.
    pub fn spawn_bridge(&self, events: mpsc::Receiver<LinkEvent>) -> JoinHandle<()> {
        tokio::spawn(run_bridge(
            self.channels.clone(),
            self.notifications.clone(),
            self.crypto.clone(),
            self.session.clone(),
            events,
        ))
    }

    /// Force-logout a user everywhere. When the target is the locally
    /// signed-in user, the local session is ended too.
    pub async fn force_logout_user(&self, id: &str) -> OpResult<()> {
        let was_self = self.admin.force_logout(id).await?;
        if was_self {
            self.session.logout(LogoutReason::Forced);
        }
        Ok(())
    }

    /// Stop the socket task and the session expiry timer. Session keys
    /// live only in memory and die with the process.
    pub async fn shutdown(&self) {
        self.session.teardown();
        self.socket.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionView;

    struct NullSink;

    impl NotificationSink for NullSink {
        async fn request_permission(&self) -> bool {
            false
        }
        async fn notify(&self, _title: &str, _body: &str) {}
        fn play_sound(&self) {}
    }

    #[tokio::test]
    async fn test_context_starts_logged_out_with_system_channels() {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let (context, events) =
            CoreContext::start_with_store(CoreConfig::default(), NullSink, store);
        let bridge = context.spawn_bridge(events);

        assert!(!context.session.is_authenticated());
        assert_eq!(context.channels.active_channel(), "general");
        let channels = context.channels.get_available_channels().await;
        assert_eq!(channels.len(), 2);

        context.shutdown().await;
        bridge.await.unwrap();
    }

    #[tokio::test]
    async fn test_context_restores_persisted_session() {
        use carelink_shared::types::{Role, User};

        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        {
            let guard = store.lock().unwrap();
            guard
                .save_session(
                    "tok-1",
                    &User {
                        id: "u-1".to_string(),
                        username: "nurse1".to_string(),
                        display_name: "Nurse One".to_string(),
                        role: Role::User,
                    },
                )
                .unwrap();
        }

        let (context, _events) =
            CoreContext::start_with_store(CoreConfig::default(), NullSink, store);
        assert!(context.session.is_authenticated());
        assert_eq!(context.session.token().as_deref(), Some("tok-1"));
        context.shutdown().await;
    }
}
