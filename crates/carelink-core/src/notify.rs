//! Notification dispatch with batching and focus suppression.
//!
//! Inbound messages are queued, then drained one at a time with a fixed
//! inter-item delay so a burst does not produce a wall of popups. At most
//! one sound plays per drained batch. Nothing is shown while the window is
//! focused or while OS permission is missing, but the unread counter still
//! advances so the badge stays honest.
//!
//! Notification bodies carry sender and channel only, never message text.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::debug;

use carelink_shared::constants::NOTIFY_DRAIN_DELAY;
use carelink_shared::types::ChatMessage;

use crate::events::{ListenerId, UnreadListeners};

/// Cached OS notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

/// Platform integration point: OS notifications and sound.
pub trait NotificationSink: Send + Sync {
    /// Ask the OS for notification permission. Must only be called from a
    /// user gesture; the dispatcher enforces the once-per-run caching.
    fn request_permission(&self) -> impl Future<Output = bool> + Send;

    fn notify(&self, title: &str, body: &str) -> impl Future<Output = ()> + Send;

    fn play_sound(&self);
}

struct NotifyState {
    queue: VecDeque<ChatMessage>,
    unread: u64,
    focused: bool,
    permission: PermissionState,
}

/// Queues inbound messages and shows them at a humane rate.
pub struct NotificationDispatcher<S> {
    sink: S,
    state: Arc<Mutex<NotifyState>>,
    listeners: Arc<UnreadListeners>,
}

impl<S: NotificationSink> NotificationDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(NotifyState {
                queue: VecDeque::new(),
                unread: 0,
                // The window is in front when the app starts.
                focused: true,
                permission: PermissionState::Unknown,
            })),
            listeners: Arc::new(UnreadListeners::new()),
        }
    }

    pub fn set_window_focused(&self, focused: bool) {
        self.state.lock().unwrap().focused = focused;
    }

    pub fn unread(&self) -> u64 {
        self.state.lock().unwrap().unread
    }

    pub fn mark_all_read(&self) {
        self.state.lock().unwrap().unread = 0;
        self.listeners.emit(0);
    }

    pub fn add_unread_listener(
        &self,
        listener: impl Fn(u64) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add(Arc::new(listener))
    }

    pub fn remove_unread_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Resolve OS permission, asking at most once per run. Call from a
    /// user gesture.
    pub async fn request_permission_on_gesture(&self) -> bool {
        let cached = self.state.lock().unwrap().permission;
        match cached {
            PermissionState::Granted => true,
            PermissionState::Denied => false,
            PermissionState::Unknown => {
                let granted = self.sink.request_permission().await;
                self.state.lock().unwrap().permission = if granted {
                    PermissionState::Granted
                } else {
                    PermissionState::Denied
                };
                granted
            }
        }
    }

    /// Queue inbound messages, dropping the current user's own. Returns
    /// how many were accepted.
    pub fn ingest(&self, batch: Vec<ChatMessage>, current_user_id: &str) -> usize {
        let accepted: Vec<ChatMessage> = batch
            .into_iter()
            .filter(|m| m.sender != current_user_id)
            .collect();
        if accepted.is_empty() {
            return 0;
        }

        let count = accepted.len();
        let unread = {
            let mut state = self.state.lock().unwrap();
            state.queue.extend(accepted);
            state.unread += count as u64;
            state.unread
        };
        self.listeners.emit(unread);
        count
    }

    /// Drain the queue, one item per delay tick. Nothing is shown while
    /// focused or unpermitted, and at most one sound plays per batch.
    pub async fn drain(&self) {
        let (batch, visible) = {
            let mut state = self.state.lock().unwrap();
            let batch: Vec<ChatMessage> = state.queue.drain(..).collect();
            let visible = !state.focused && state.permission == PermissionState::Granted;
            (batch, visible)
        };
        if batch.is_empty() {
            return;
        }
        if !visible {
            debug!(count = batch.len(), "Notifications suppressed");
            return;
        }

        self.sink.play_sound();
        let mut first = true;
        for message in batch {
            if !first {
                tokio::time::sleep(NOTIFY_DRAIN_DELAY).await;
            }
            first = false;
            let body = format!("{} in #{}", message.sender, message.channel);
            self.sink.notify("New message", &body).await;
        }
    }

}
