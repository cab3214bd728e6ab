//! Glue between the socket event stream and the services.
//!
//! Push events are applied in receipt order. Inbound chat messages are
//! decrypted and handed to the notification dispatcher, but only while a
//! session is active; frames arriving before login are dropped.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use carelink_shared::crypto::EncryptionProvider;
use carelink_shared::protocol::ServerFrame;
use carelink_transport::rest::ChannelApi;
use carelink_transport::socket::LinkEvent;
use carelink_transport::ChannelLink;

use crate::channels::ChannelService;
use crate::notify::{NotificationDispatcher, NotificationSink};
use crate::session::SessionView;

/// Consume socket events until the socket task ends.
pub async fn run_bridge<L, R, S, N>(
    channels: Arc<ChannelService<L, R, S>>,
    notifications: Arc<NotificationDispatcher<N>>,
    crypto: Arc<Mutex<EncryptionProvider>>,
    session: impl SessionView,
    mut events: mpsc::Receiver<LinkEvent>,
) where
    L: ChannelLink,
    R: ChannelApi,
    S: SessionView,
    N: NotificationSink + 'static,
{
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Connected => {
                info!("Socket connected, refreshing channel list");
                let _ = channels.get_available_channels().await;
            }
            LinkEvent::Disconnected => {
                warn!("Socket disconnected");
            }
            LinkEvent::Frame(ServerFrame::Message { envelope }) => {
                if !session.is_authenticated() {
                    debug!(message = %envelope.id, "Dropping message, no session");
                    continue;
                }
                if !envelope.encrypted {
                    warn!(message = %envelope.id, "Received unencrypted message");
                }
                let message = crypto.lock().unwrap().decrypt_message(&envelope);
                let me = session
                    .current_user()
                    .map(|u| u.id)
                    .unwrap_or_default();
                if notifications.ingest(vec![message], &me) > 0 {
                    // Drain on its own task; the inter-item delay must not
                    // hold up frames still waiting in the event stream.
                    let notifications = notifications.clone();
                    tokio::spawn(async move { notifications.drain().await });
                }
            }
            LinkEvent::Frame(frame) => {
                channels.apply_event(&frame);
            }
        }
    }
    debug!("Socket event stream closed, bridge exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_shared::protocol::ClientFrame;
    use carelink_shared::types::{
        Channel, ChannelKind, ChatMessage, LinkStatus, MessageKind, Role, User,
    };
    use carelink_store::Store;
    use carelink_transport::TransportError;
    use chrono::Utc;
    use std::time::Duration;

    struct IdleLink;

    impl ChannelLink for IdleLink {
        fn status(&self) -> LinkStatus {
            LinkStatus::Disconnected
        }
        async fn request(
            &self,
            _frame: ClientFrame,
            _timeout: Duration,
        ) -> Result<ServerFrame, TransportError> {
            Err(TransportError::NotConnected)
        }
        async fn send(&self, _frame: ClientFrame) -> Result<(), TransportError> {
            Err(TransportError::NotConnected)
        }
    }

    struct IdleRest;

    impl ChannelApi for IdleRest {
        async fn create_channel(
            &self,
            _token: &str,
            _channel: &Channel,
        ) -> Result<Channel, TransportError> {
            Err(TransportError::NotConnected)
        }
        async fn update_channel(
            &self,
            _token: &str,
            _channel: &Channel,
        ) -> Result<Channel, TransportError> {
            Err(TransportError::NotConnected)
        }
        async fn delete_channel(&self, _token: &str, _id: &str) -> Result<(), TransportError> {
            Err(TransportError::NotConnected)
        }
        async fn invite_to_channel(
            &self,
            _token: &str,
            _id: &str,
            _user_id: &str,
        ) -> Result<(), TransportError> {
            Err(TransportError::NotConnected)
        }
    }

    #[derive(Clone)]
    struct FixedSession {
        user: Option<User>,
    }

    impl SessionView for FixedSession {
        fn is_authenticated(&self) -> bool {
            self.user.is_some()
        }
        fn current_user(&self) -> Option<User> {
            self.user.clone()
        }
        fn token(&self) -> Option<String> {
            self.user.as_ref().map(|_| "tok".to_string())
        }
        fn has_permission(&self, _permission: &str) -> bool {
            true
        }
    }

    struct SilentSink;

    impl NotificationSink for SilentSink {
        async fn request_permission(&self) -> bool {
            false
        }
        async fn notify(&self, _title: &str, _body: &str) {}
        fn play_sound(&self) {}
    }

    /// Grants permission but never finishes showing a notification.
    struct StuckSink;

    impl NotificationSink for StuckSink {
        async fn request_permission(&self) -> bool {
            true
        }
        async fn notify(&self, _title: &str, _body: &str) {
            std::future::pending::<()>().await
        }
        fn play_sound(&self) {}
    }

    fn logged_in() -> FixedSession {
        FixedSession {
            user: Some(User {
                id: "me".to_string(),
                username: "tester".to_string(),
                display_name: "Tester".to_string(),
                role: Role::User,
            }),
        }
    }

    fn harness(
        session: FixedSession,
    ) -> (
        Arc<ChannelService<IdleLink, IdleRest, FixedSession>>,
        Arc<NotificationDispatcher<SilentSink>>,
        Arc<Mutex<EncryptionProvider>>,
    ) {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let channels = Arc::new(ChannelService::new(IdleLink, IdleRest, session, store));
        let notifications = Arc::new(NotificationDispatcher::new(SilentSink));
        let crypto = Arc::new(Mutex::new(EncryptionProvider::new()));
        (channels, notifications, crypto)
    }

    fn chat(sender: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            recipient: None,
            channel: "general".to_string(),
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            text: text.to_string(),
        }
    }

    fn ward(id: &str, description: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_string(),
            description: description.to_string(),
            kind: ChannelKind::Private,
            readonly: false,
            created_at: Utc::now(),
            members: None,
        }
    }

    #[tokio::test]
    async fn test_channel_pushes_applied_in_receipt_order() {
        let session = logged_in();
        let (channels, notifications, crypto) = harness(session.clone());
        let (tx, rx) = mpsc::channel(8);

        let bridge = tokio::spawn(run_bridge(
            channels.clone(),
            notifications,
            crypto,
            session,
            rx,
        ));

        tx.send(LinkEvent::Frame(ServerFrame::ChannelCreated {
            message_id: None,
            channel: ward("ward-7-1", "first"),
        }))
        .await
        .unwrap();
        tx.send(LinkEvent::Frame(ServerFrame::ChannelUpdated {
            message_id: None,
            channel: ward("ward-7-1", "second"),
        }))
        .await
        .unwrap();
        tx.send(LinkEvent::Frame(ServerFrame::ChannelDeleted {
            message_id: None,
            channel_id: "ward-7-1".to_string(),
        }))
        .await
        .unwrap();
        drop(tx);
        bridge.await.unwrap();

        let cached = channels.get_available_channels().await;
        assert!(!cached.iter().any(|c| c.id == "ward-7-1"));
    }

    #[tokio::test]
    async fn test_inbound_message_decrypted_and_counted() {
        let session = logged_in();
        let (channels, notifications, crypto) = harness(session.clone());
        let envelope = crypto
            .lock()
            .unwrap()
            .encrypt_message(&chat("colleague", "shift change at 19:00"));

        let (tx, rx) = mpsc::channel(8);
        let bridge = tokio::spawn(run_bridge(
            channels,
            notifications.clone(),
            crypto,
            session,
            rx,
        ));

        tx.send(LinkEvent::Frame(ServerFrame::Message { envelope }))
            .await
            .unwrap();
        drop(tx);
        bridge.await.unwrap();

        assert_eq!(notifications.unread(), 1);
    }

    #[tokio::test]
    async fn test_own_message_echo_not_counted() {
        let session = logged_in();
        let (channels, notifications, crypto) = harness(session.clone());
        let envelope = crypto
            .lock()
            .unwrap()
            .encrypt_message(&chat("me", "my own message"));

        let (tx, rx) = mpsc::channel(8);
        let bridge = tokio::spawn(run_bridge(
            channels,
            notifications.clone(),
            crypto,
            session,
            rx,
        ));

        tx.send(LinkEvent::Frame(ServerFrame::Message { envelope }))
            .await
            .unwrap();
        drop(tx);
        bridge.await.unwrap();

        assert_eq!(notifications.unread(), 0);
    }

    #[tokio::test]
    async fn test_stuck_notification_does_not_stall_pushes() {
        let session = logged_in();
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let channels = Arc::new(ChannelService::new(
            IdleLink,
            IdleRest,
            session.clone(),
            store,
        ));
        let notifications = Arc::new(NotificationDispatcher::new(StuckSink));
        notifications.set_window_focused(false);
        assert!(notifications.request_permission_on_gesture().await);
        let crypto = Arc::new(Mutex::new(EncryptionProvider::new()));
        let envelope = crypto
            .lock()
            .unwrap()
            .encrypt_message(&chat("colleague", "hello"));

        let (tx, rx) = mpsc::channel(8);
        let bridge = tokio::spawn(run_bridge(
            channels.clone(),
            notifications.clone(),
            crypto,
            session,
            rx,
        ));

        // A channel push right behind a message must still be applied even
        // though the notification for that message never finishes showing.
        tx.send(LinkEvent::Frame(ServerFrame::Message { envelope }))
            .await
            .unwrap();
        tx.send(LinkEvent::Frame(ServerFrame::ChannelCreated {
            message_id: None,
            channel: ward("ward-7-1", "new"),
        }))
        .await
        .unwrap();
        drop(tx);
        bridge.await.unwrap();

        assert_eq!(notifications.unread(), 1);
        let cached = channels.get_available_channels().await;
        assert!(cached.iter().any(|c| c.id == "ward-7-1"));
    }

    #[tokio::test]
    async fn test_messages_dropped_without_session() {
        let session = FixedSession { user: None };
        let (channels, notifications, crypto) = harness(session.clone());
        let envelope = crypto
            .lock()
            .unwrap()
            .encrypt_message(&chat("colleague", "hello"));

        let (tx, rx) = mpsc::channel(8);
        let bridge = tokio::spawn(run_bridge(
            channels,
            notifications.clone(),
            crypto,
            session,
            rx,
        ));

        tx.send(LinkEvent::Frame(ServerFrame::Message { envelope }))
            .await
            .unwrap();
        drop(tx);
        bridge.await.unwrap();

        assert_eq!(notifications.unread(), 0);
    }
}
