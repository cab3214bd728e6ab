//! HTTP request/response fallback transport.
//!
//! Covers authentication, admin user management, and the secondary path
//! for channel writes when the socket is unavailable. All authenticated
//! calls carry `Authorization: Bearer <token>`.
//!
//! The API surface is split into traits so the service layer stays generic
//! and tests can inject spies that count transport calls.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use carelink_shared::types::{is_system_channel, Channel, Role, User};

use crate::error::TransportError;

/// Token + user pair returned by a successful credential exchange.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

/// Payload for creating (or importing) a user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub role: Role,
}

/// Partial user update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Remote credential exchange and profile maintenance.
pub trait AuthApi: Send + Sync {
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, TransportError>> + Send;

    fn register(
        &self,
        req: &NewUser,
    ) -> impl Future<Output = Result<AuthSession, TransportError>> + Send;

    fn update_profile(
        &self,
        token: &str,
        update: &UserUpdate,
    ) -> impl Future<Output = Result<User, TransportError>> + Send;

    fn change_password(
        &self,
        token: &str,
        current: &str,
        new: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Channel CRUD over the REST fallback.
pub trait ChannelApi: Send + Sync {
    fn create_channel(
        &self,
        token: &str,
        channel: &Channel,
    ) -> impl Future<Output = Result<Channel, TransportError>> + Send;

    fn update_channel(
        &self,
        token: &str,
        channel: &Channel,
    ) -> impl Future<Output = Result<Channel, TransportError>> + Send;

    fn delete_channel(
        &self,
        token: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn invite_to_channel(
        &self,
        token: &str,
        id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Administrative user management.
pub trait AdminApi: Send + Sync {
    fn list_users(&self, token: &str)
        -> impl Future<Output = Result<Vec<User>, TransportError>> + Send;

    fn create_user(
        &self,
        token: &str,
        req: &NewUser,
    ) -> impl Future<Output = Result<User, TransportError>> + Send;

    fn update_user(
        &self,
        token: &str,
        id: &str,
        update: &UserUpdate,
    ) -> impl Future<Output = Result<User, TransportError>> + Send;

    fn delete_user(
        &self,
        token: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn set_user_role(
        &self,
        token: &str,
        id: &str,
        role: Role,
    ) -> impl Future<Output = Result<User, TransportError>> + Send;

    fn reset_password(
        &self,
        token: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn import_users(
        &self,
        token: &str,
        users: &[NewUser],
    ) -> impl Future<Output = Result<usize, TransportError>> + Send;

    fn force_logout(
        &self,
        token: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Reqwest-backed implementation of the REST transport.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ApiError {
    error: String,
}

#[derive(Deserialize)]
struct ImportResult {
    imported: usize,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json().await?)
        } else {
            Err(status_error(status, resp).await)
        }
    }

    async fn check_empty(resp: reqwest::Response) -> Result<(), TransportError> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, resp).await)
        }
    }
}

async fn status_error(status: reqwest::StatusCode, resp: reqwest::Response) -> TransportError {
    let message = match resp.json::<ApiError>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    TransportError::Status {
        code: status.as_u16(),
        message,
    }
}

impl AuthApi for RestClient {
    async fn login(&self, username: &str, password: &str) -> Result<AuthSession, TransportError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn register(&self, req: &NewUser) -> Result<AuthSession, TransportError> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(req)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn update_profile(
        &self,
        token: &str,
        update: &UserUpdate,
    ) -> Result<User, TransportError> {
        let resp = self
            .http
            .put(self.url("/auth/profile"))
            .bearer_auth(token)
            .json(update)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn change_password(
        &self,
        token: &str,
        current: &str,
        new: &str,
    ) -> Result<(), TransportError> {
        let resp = self
            .http
            .put(self.url("/auth/password"))
            .bearer_auth(token)
            .json(&json!({ "currentPassword": current, "newPassword": new }))
            .send()
            .await?;
        Self::check_empty(resp).await
    }
}

impl ChannelApi for RestClient {
    async fn create_channel(
        &self,
        token: &str,
        channel: &Channel,
    ) -> Result<Channel, TransportError> {
        let resp = self
            .http
            .post(self.url("/api/channels"))
            .bearer_auth(token)
            .json(channel)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn update_channel(
        &self,
        token: &str,
        channel: &Channel,
    ) -> Result<Channel, TransportError> {
        let resp = self
            .http
            .put(self.url(&format!("/api/channels/{}", channel.id)))
            .bearer_auth(token)
            .json(channel)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn delete_channel(&self, token: &str, id: &str) -> Result<(), TransportError> {
        // Defense in depth: the guard holds on the fallback path too, not
        // only in the service layer.
        if is_system_channel(id) {
            return Err(TransportError::Refused(
                "system channels cannot be deleted".into(),
            ));
        }
        let resp = self
            .http
            .delete(self.url(&format!("/api/channels/{id}")))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_empty(resp).await
    }

    async fn invite_to_channel(
        &self,
        token: &str,
        id: &str,
        user_id: &str,
    ) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/channels/{id}/invite")))
            .bearer_auth(token)
            .json(&json!({ "userId": user_id }))
            .send()
            .await?;
        Self::check_empty(resp).await
    }
}

impl AdminApi for RestClient {
    async fn list_users(&self, token: &str) -> Result<Vec<User>, TransportError> {
        let resp = self
            .http
            .get(self.url("/admin/users"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn create_user(&self, token: &str, req: &NewUser) -> Result<User, TransportError> {
        let resp = self
            .http
            .post(self.url("/admin/users"))
            .bearer_auth(token)
            .json(req)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn update_user(
        &self,
        token: &str,
        id: &str,
        update: &UserUpdate,
    ) -> Result<User, TransportError> {
        let resp = self
            .http
            .put(self.url(&format!("/admin/users/{id}")))
            .bearer_auth(token)
            .json(update)
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn delete_user(&self, token: &str, id: &str) -> Result<(), TransportError> {
        let resp = self
            .http
            .delete(self.url(&format!("/admin/users/{id}")))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_empty(resp).await
    }

    async fn set_user_role(
        &self,
        token: &str,
        id: &str,
        role: Role,
    ) -> Result<User, TransportError> {
        let resp = self
            .http
            .post(self.url(&format!("/admin/users/{id}/role")))
            .bearer_auth(token)
            .json(&json!({ "role": role }))
            .send()
            .await?;
        Self::check(resp).await
    }

    async fn reset_password(&self, token: &str, id: &str) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(self.url(&format!("/admin/users/{id}/reset-password")))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_empty(resp).await
    }

    async fn import_users(&self, token: &str, users: &[NewUser]) -> Result<usize, TransportError> {
        let resp = self
            .http
            .post(self.url("/admin/users/import"))
            .bearer_auth(token)
            .json(&json!({ "users": users }))
            .send()
            .await?;
        let result: ImportResult = Self::check(resp).await?;
        Ok(result.imported)
    }

    async fn force_logout(&self, token: &str, id: &str) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(self.url(&format!("/admin/users/{id}/logout")))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check_empty(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_channel_delete_refused_without_network() {
        // base_url points nowhere; the guard must fire before any request.
        let client = RestClient::new("http://127.0.0.1:1");
        let result = client.delete_channel("tok", "general").await;
        assert!(matches!(result, Err(TransportError::Refused(_))));

        let result = client.delete_channel("tok", "announcements").await;
        assert!(matches!(result, Err(TransportError::Refused(_))));
    }

    #[test]
    fn test_base_url_normalized() {
        let client = RestClient::new("https://chat.example.org/");
        assert_eq!(
            client.url("/auth/login"),
            "https://chat.example.org/auth/login"
        );
    }
}
