//! Permission-gated user administration.
//!
//! Every operation checks the caller's session and role before touching the
//! transport, so an unauthorized call never leaves the process. Forced
//! logout of the locally signed-in user is reported back to the caller so
//! the session can be torn down too (see [`crate::state::CoreContext`]).

use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::info;

use carelink_shared::types::{Role, User};
use carelink_shared::{OpError, OpResult};
use carelink_store::models::AuditCategory;
use carelink_store::Store;
use carelink_transport::rest::{AdminApi, NewUser, UserUpdate};

use crate::map_transport;
use crate::permissions::USER_MANAGE;
use crate::session::SessionView;

/// User management operations, all requiring the `user.manage` permission.
pub struct AdminService<R, S> {
    rest: R,
    session: S,
    store: Arc<Mutex<Store>>,
}

impl<R, S> AdminService<R, S>
where
    R: AdminApi,
    S: SessionView,
{
    pub fn new(rest: R, session: S, store: Arc<Mutex<Store>>) -> Self {
        Self {
            rest,
            session,
            store,
        }
    }

    pub async fn list_users(&self) -> OpResult<Vec<User>> {
        let token = self.guard()?;
        self.rest.list_users(&token).await.map_err(map_transport)
    }

    pub async fn create_user(&self, req: NewUser) -> OpResult<User> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(OpError::Validation(
                "Username and password are required".to_string(),
            ));
        }
        let token = self.guard()?;
        let user = self
            .rest
            .create_user(&token, &req)
            .await
            .map_err(map_transport)?;
        self.audit("user_create", &user.username);
        info!(username = %user.username, "User created");
        Ok(user)
    }

    pub async fn update_user(&self, id: &str, update: UserUpdate) -> OpResult<User> {
        let token = self.guard()?;
        let user = self
            .rest
            .update_user(&token, id, &update)
            .await
            .map_err(map_transport)?;
        self.audit("user_update", &user.username);
        Ok(user)
    }

    pub async fn delete_user(&self, id: &str) -> OpResult<()> {
        let token = self.guard()?;
        self.rest
            .delete_user(&token, id)
            .await
            .map_err(map_transport)?;
        self.audit("user_delete", id);
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    pub async fn set_user_role(&self, id: &str, role: Role) -> OpResult<User> {
        let token = self.guard()?;
        let user = self
            .rest
            .set_user_role(&token, id, role)
            .await
            .map_err(map_transport)?;
        self.audit("user_role_change", &user.username);
        info!(username = %user.username, ?role, "Role changed");
        Ok(user)
    }

    pub async fn reset_password(&self, id: &str) -> OpResult<()> {
        let token = self.guard()?;
        self.rest
            .reset_password(&token, id)
            .await
            .map_err(map_transport)?;
        self.audit("password_reset", id);
        Ok(())
    }

    /// Bulk import. Returns the number of accounts the server accepted.
    pub async fn import_users(&self, users: Vec<NewUser>) -> OpResult<usize> {
        if users.is_empty() {
            return Err(OpError::Validation("No users to import".to_string()));
        }
        if let Some(bad) = users
            .iter()
            .find(|u| u.username.trim().is_empty() || u.password.is_empty())
        {
            return Err(OpError::Validation(format!(
                "Import entry '{}' is missing a username or password",
                bad.username
            )));
        }
        let token = self.guard()?;
        let imported = self
            .rest
            .import_users(&token, &users)
            .await
            .map_err(map_transport)?;
        let store = self.store.lock().unwrap();
        let _ = store.audit(
            AuditCategory::Admin,
            "user_import",
            json!({ "count": imported }),
        );
        info!(imported, "Users imported");
        Ok(imported)
    }

    /// Terminate another user's session. Returns `true` when the target is
    /// the locally signed-in user, so the caller can end the local session
    /// as well.
    pub async fn force_logout(&self, id: &str) -> OpResult<bool> {
        let token = self.guard()?;
        self.rest
            .force_logout(&token, id)
            .await
            .map_err(map_transport)?;
        self.audit("force_logout", id);

        let is_self = self
            .session
            .current_user()
            .is_some_and(|u| u.id == id);
        Ok(is_self)
    }

    fn guard(&self) -> OpResult<String> {
        let token = self.session.token().ok_or(OpError::NotAuthenticated)?;
        if !self.session.has_permission(USER_MANAGE) {
            return Err(OpError::PermissionDenied);
        }
        Ok(token)
    }

    fn audit(&self, action: &str, subject: &str) {
        let actor = self
            .session
            .current_user()
            .map(|u| u.username)
            .unwrap_or_default();
        let store = self.store.lock().unwrap();
        let _ = store.audit(
            AuditCategory::Admin,
            action,
            json!({ "subject": subject, "actor": actor }),
        );
    }
}
