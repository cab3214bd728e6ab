//! Typed in-process event notification.
//!
//! Services expose `add_*_listener` / `remove_*_listener` pairs backed by
//! the registries here. Listeners are invoked synchronously in registration
//! order; a panicking listener is isolated so the remaining listeners still
//! run. Emission works on a snapshot taken under the registry lock and then
//! released, so a listener may register or remove listeners while handling
//! an event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use carelink_shared::types::{Channel, User};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserAction,
    /// The inactivity window elapsed.
    Inactivity,
    /// An administrator terminated the session.
    Forced,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::UserAction => "user_action",
            LogoutReason::Inactivity => "inactivity",
            LogoutReason::Forced => "forced",
        }
    }
}

/// Session lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn { user: User },
    LoggedOut { user: User, reason: LogoutReason },
}

/// Opaque handle returned by listener registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Registry<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<T>)>,
}

impl<T: ?Sized> Registry<T> {
    fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    fn add(&mut self, listener: Arc<T>) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        ListenerId(id)
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id.0);
        self.entries.len() != before
    }

    fn snapshot(&self) -> Vec<(u64, Arc<T>)> {
        self.entries.clone()
    }
}

/// Registry of session lifecycle listeners.
pub(crate) struct AuthListeners {
    inner: Mutex<Registry<dyn Fn(&AuthEvent) + Send + Sync>>,
}

impl AuthListeners {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn Fn(&AuthEvent) + Send + Sync>) -> ListenerId {
        self.inner.lock().unwrap().add(listener)
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.inner.lock().unwrap().remove(id)
    }

    pub fn emit(&self, event: &AuthEvent) {
        let entries = self.inner.lock().unwrap().snapshot();
        for (id, listener) in entries {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(listener_id = id, "Auth listener panicked");
            }
        }
    }
}

/// Registry of channel list listeners.
///
/// Entries are `Arc` so a freshly registered listener can also receive its
/// initial snapshot from a spawned task without blocking registration.
pub(crate) struct ChannelListeners {
    inner: Mutex<Registry<dyn Fn(&[Channel]) + Send + Sync>>,
}

impl ChannelListeners {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn Fn(&[Channel]) + Send + Sync>) -> ListenerId {
        self.inner.lock().unwrap().add(listener)
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.inner.lock().unwrap().remove(id)
    }

    pub fn emit(&self, channels: &[Channel]) {
        let entries = self.inner.lock().unwrap().snapshot();
        for (id, listener) in entries {
            if catch_unwind(AssertUnwindSafe(|| listener(channels))).is_err() {
                tracing::error!(listener_id = id, "Channel listener panicked");
            }
        }
    }
}

/// Registry of unread-count listeners.
pub(crate) struct UnreadListeners {
    inner: Mutex<Registry<dyn Fn(u64) + Send + Sync>>,
}

impl UnreadListeners {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn Fn(u64) + Send + Sync>) -> ListenerId {
        self.inner.lock().unwrap().add(listener)
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.inner.lock().unwrap().remove(id)
    }

    pub fn emit(&self, unread: u64) {
        let entries = self.inner.lock().unwrap().snapshot();
        for (id, listener) in entries {
            if catch_unwind(AssertUnwindSafe(|| listener(unread))).is_err() {
                tracing::error!(listener_id = id, "Unread listener panicked");
            }
        }
    }
}
