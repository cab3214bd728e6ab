//! Session lifecycle: login, logout, restore, inactivity expiry.
//!
//! Login resolves through three tiers: the configured bootstrap admin
//! credential (constant-time compare), the remote auth service, and, when
//! enabled, the locally persisted user list as an offline fallback.
//!
//! An expiry watcher task sleeps until the inactivity window would elapse,
//! then re-checks the last recorded activity. Activity recorded while the
//! watcher slept pushes the deadline out; the watcher just sleeps again for
//! the remaining delta instead of expiring.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use carelink_shared::types::{Role, User};
use carelink_shared::{OpError, OpResult};
use carelink_store::models::AuditCategory;
use carelink_store::Store;
use carelink_transport::rest::{AuthApi, UserUpdate};
use carelink_transport::TransportError;

use crate::config::CoreConfig;
use crate::events::{AuthEvent, AuthListeners, ListenerId, LogoutReason};
use crate::map_transport;
use crate::permissions::role_has_permission;

/// Read-only snapshot of session timing, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub authenticated: bool,
    /// Time since the last recorded activity.
    pub idle_for: Duration,
    /// Time until expiry if no further activity arrives.
    pub time_remaining: Duration,
}

struct SessionInner {
    token: Option<String>,
    user: Option<User>,
    last_activity: Instant,
    watcher: Option<JoinHandle<()>>,
}

/// Owns the authenticated session and its inactivity timer.
pub struct SessionManager<A> {
    auth: A,
    store: Arc<Mutex<Store>>,
    config: CoreConfig,
    inner: Arc<Mutex<SessionInner>>,
    listeners: Arc<AuthListeners>,
}

/// Read access to the session, implemented by [`SessionManager`] and used
/// by the other services so they stay generic and testable.
pub trait SessionView: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn current_user(&self) -> Option<User>;
    fn token(&self) -> Option<String>;
    fn has_permission(&self, permission: &str) -> bool;
}

impl<A: AuthApi> SessionManager<A> {
    pub fn new(auth: A, store: Arc<Mutex<Store>>, config: CoreConfig) -> Self {
        Self {
            auth,
            store,
            config,
            inner: Arc::new(Mutex::new(SessionInner {
                token: None,
                user: None,
                last_activity: Instant::now(),
                watcher: None,
            })),
            listeners: Arc::new(AuthListeners::new()),
        }
    }

    /// Authenticate and establish a session.
    ///
    /// Tier 1 is the configured bootstrap admin, compared in constant time.
    /// Tier 2 is the remote auth service. Tier 3, only when
    /// `local_auth_fallback` is enabled and the remote service was
    /// unreachable (not a credential rejection), is the local user table.
    pub async fn login(&self, username: &str, password: &str) -> OpResult<User> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(OpError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        if let Some(boot) = &self.config.bootstrap_admin {
            let user_ok = constant_time_eq(username, &boot.username);
            let pass_ok = constant_time_eq(password, &boot.password);
            if user_ok & pass_ok {
                let user = User {
                    id: "bootstrap-admin".to_string(),
                    username: boot.username.clone(),
                    display_name: boot.username.clone(),
                    role: Role::Admin,
                };
                self.establish(new_token(), user.clone(), "bootstrap");
                return Ok(user);
            }
        }

        match self.auth.login(username, password).await {
            Ok(session) => {
                let user = session.user.clone();
                self.establish(session.token, session.user, "remote");
                Ok(user)
            }
            Err(TransportError::Status { code, message }) if code == 401 || code == 403 => {
                debug!(username, "Credentials rejected by auth service");
                Err(OpError::Validation(message))
            }
            Err(e) if self.config.local_auth_fallback => {
                warn!(error = %e, "Auth service unreachable, trying local fallback");
                self.login_local(username, password)
            }
            Err(e) => Err(map_transport(e)),
        }
    }

    fn login_local(&self, username: &str, password: &str) -> OpResult<User> {
        let verified = {
            let store = self.store.lock().unwrap();
            store.verify_local_user(username, password)
        };
        match verified {
            Ok(Some(user)) => {
                {
                    let store = self.store.lock().unwrap();
                    let _ = store.audit(
                        AuditCategory::Security,
                        "local_auth_fallback",
                        json!({ "username": user.username }),
                    );
                }
                self.establish(new_token(), user.clone(), "local-fallback");
                Ok(user)
            }
            Ok(None) => Err(OpError::Validation(
                "Invalid username or password".to_string(),
            )),
            Err(e) => Err(OpError::Transport(e.to_string())),
        }
    }

    /// End the session. Returns whether a session was actually active, so
    /// callers can distinguish logout from a no-op.
    pub fn logout(&self, reason: LogoutReason) -> bool {
        clear_session(&self.inner, &self.listeners, &self.store, reason).is_some()
    }

    /// Restore a previously persisted session, if any. Returns whether a
    /// session was restored.
    pub fn restore(&self) -> bool {
        let loaded = {
            let store = self.store.lock().unwrap();
            store.load_session()
        };
        match loaded {
            Ok(Some((token, user))) => {
                info!(username = %user.username, "Restored persisted session");
                self.establish(token, user, "restore");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted session");
                false
            }
        }
    }

    /// Record user activity, pushing the expiry deadline out.
    pub fn update_activity(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.user.is_some() {
            inner.last_activity = Instant::now();
        }
    }

    /// Timing snapshot. Pure read, never mutates the deadline.
    pub fn session_status(&self) -> SessionStatus {
        let inner = self.inner.lock().unwrap();
        if inner.user.is_none() {
            return SessionStatus {
                authenticated: false,
                idle_for: Duration::ZERO,
                time_remaining: Duration::ZERO,
            };
        }
        let idle_for = inner.last_activity.elapsed();
        SessionStatus {
            authenticated: true,
            idle_for,
            time_remaining: self.config.session_timeout.saturating_sub(idle_for),
        }
    }

    /// Update the current user's display name.
    pub async fn update_profile(&self, display_name: &str) -> OpResult<User> {
        if display_name.trim().is_empty() {
            return Err(OpError::Validation("Display name is required".to_string()));
        }
        let token = self.token().ok_or(OpError::NotAuthenticated)?;
        let update = UserUpdate {
            display_name: Some(display_name.trim().to_string()),
        };
        let user = self
            .auth
            .update_profile(&token, &update)
            .await
            .map_err(map_transport)?;

        self.inner.lock().unwrap().user = Some(user.clone());
        {
            let store = self.store.lock().unwrap();
            if let Err(e) = store.save_session(&token, &user) {
                warn!(error = %e, "Failed to persist updated profile");
            }
        }
        Ok(user)
    }

    pub async fn change_password(&self, current: &str, new: &str) -> OpResult<()> {
        if new.is_empty() {
            return Err(OpError::Validation("New password is required".to_string()));
        }
        let token = self.token().ok_or(OpError::NotAuthenticated)?;
        self.auth
            .change_password(&token, current, new)
            .await
            .map_err(map_transport)?;

        if let Some(user) = self.current_user() {
            let store = self.store.lock().unwrap();
            let _ = store.audit(
                AuditCategory::Auth,
                "password_change",
                json!({ "username": user.username }),
            );
        }
        Ok(())
    }

    pub fn add_auth_listener(
        &self,
        listener: impl Fn(&AuthEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add(Arc::new(listener))
    }

    pub fn remove_auth_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Abort the expiry watcher without emitting events. Shutdown path.
    pub fn teardown(&self) {
        if let Some(handle) = self.inner.lock().unwrap().watcher.take() {
            handle.abort();
        }
    }

    fn establish(&self, token: String, user: User, method: &str) {
        let old_watcher = {
            let mut inner = self.inner.lock().unwrap();
            inner.token = Some(token.clone());
            inner.user = Some(user.clone());
            inner.last_activity = Instant::now();
            inner.watcher.take()
        };
        if let Some(handle) = old_watcher {
            handle.abort();
        }

        {
            let store = self.store.lock().unwrap();
            if let Err(e) = store.save_session(&token, &user) {
                warn!(error = %e, "Failed to persist session");
            }
            let _ = store.audit(
                AuditCategory::Auth,
                "login",
                json!({ "username": user.username, "method": method }),
            );
        }

        let handle = tokio::spawn(expiry_watch(
            self.inner.clone(),
            self.listeners.clone(),
            self.store.clone(),
            self.config.session_timeout,
        ));
        self.inner.lock().unwrap().watcher = Some(handle);

        info!(username = %user.username, method, "Session established");
        self.listeners.emit(&AuthEvent::LoggedIn { user });
    }
}

impl<A: AuthApi> SessionView for SessionManager<A> {
    fn is_authenticated(&self) -> bool {
        self.inner.lock().unwrap().user.is_some()
    }

    fn current_user(&self) -> Option<User> {
        self.inner.lock().unwrap().user.clone()
    }

    fn token(&self) -> Option<String> {
        self.inner.lock().unwrap().token.clone()
    }

    fn has_permission(&self, permission: &str) -> bool {
        match self.current_user() {
            Some(user) => role_has_permission(user.role, permission),
            None => false,
        }
    }
}

impl<S: SessionView> SessionView for Arc<S> {
    fn is_authenticated(&self) -> bool {
        (**self).is_authenticated()
    }
    fn current_user(&self) -> Option<User> {
        (**self).current_user()
    }
    fn token(&self) -> Option<String> {
        (**self).token()
    }
    fn has_permission(&self, permission: &str) -> bool {
        (**self).has_permission(permission)
    }
}

/// Tear down session state and emit `LoggedOut`. Returns the user that was
/// logged out, or `None` if no session was active.
fn clear_session(
    inner: &Arc<Mutex<SessionInner>>,
    listeners: &Arc<AuthListeners>,
    store: &Arc<Mutex<Store>>,
    reason: LogoutReason,
) -> Option<User> {
    let (user, watcher) = {
        let mut guard = inner.lock().unwrap();
        let user = guard.user.take()?;
        guard.token = None;
        (user, guard.watcher.take())
    };
    if let Some(handle) = watcher {
        handle.abort();
    }

    {
        let store = store.lock().unwrap();
        if let Err(e) = store.clear_session() {
            warn!(error = %e, "Failed to clear persisted session");
        }
        let _ = store.audit(
            AuditCategory::Auth,
            "logout",
            json!({ "username": user.username, "reason": reason.as_str() }),
        );
    }

    info!(username = %user.username, reason = reason.as_str(), "Session ended");
    listeners.emit(&AuthEvent::LoggedOut {
        user: user.clone(),
        reason,
    });
    Some(user)
}

async fn expiry_watch(
    inner: Arc<Mutex<SessionInner>>,
    listeners: Arc<AuthListeners>,
    store: Arc<Mutex<Store>>,
    timeout: Duration,
) {
    loop {
        let remaining = {
            let guard = inner.lock().unwrap();
            if guard.user.is_none() {
                return;
            }
            timeout.checked_sub(guard.last_activity.elapsed())
        };
        match remaining {
            Some(d) if d > Duration::ZERO => tokio::time::sleep(d).await,
            _ => {
                clear_session(&inner, &listeners, &store, LogoutReason::Inactivity);
                return;
            }
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn new_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
