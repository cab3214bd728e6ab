//! Core configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration for local development.

use std::time::Duration;

use carelink_shared::constants::SESSION_TIMEOUT;

/// Bootstrap administrator credential, enabled only via configuration.
///
/// The original deployment shipped a hard-coded admin credential; that is
/// deliberately not reproduced. Setting `CARELINK_BOOTSTRAP_ADMIN` is an
/// explicit opt-in for development and first-run provisioning.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

/// Client core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Base URL of the REST fallback API.
    /// Env: `CARELINK_SERVER_URL`
    /// Default: `http://127.0.0.1:8080`
    pub server_url: String,

    /// `host:port` of the message socket.
    /// Env: `CARELINK_SOCKET_ADDR`
    /// Default: `127.0.0.1:4100`
    pub socket_addr: String,

    /// Inactivity window before the session expires.
    /// Env: `CARELINK_SESSION_TIMEOUT_SECS`
    /// Default: 900 (15 minutes)
    pub session_timeout: Duration,

    /// Whether the locally persisted user list may authenticate a login
    /// when the remote service is unreachable.
    /// Env: `CARELINK_LOCAL_AUTH_FALLBACK` (true/false)
    /// Default: `false`
    pub local_auth_fallback: bool,

    /// Optional bootstrap admin credential.
    /// Env: `CARELINK_BOOTSTRAP_ADMIN` (`user:pass`)
    /// Default: absent
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            socket_addr: "127.0.0.1:4100".to_string(),
            session_timeout: SESSION_TIMEOUT,
            local_auth_fallback: false,
            bootstrap_admin: None,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CARELINK_SERVER_URL") {
            config.server_url = url;
        }

        if let Ok(addr) = std::env::var("CARELINK_SOCKET_ADDR") {
            config.socket_addr = addr;
        }

        if let Ok(val) = std::env::var("CARELINK_SESSION_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.session_timeout = Duration::from_secs(secs),
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid CARELINK_SESSION_TIMEOUT_SECS, using default"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("CARELINK_LOCAL_AUTH_FALLBACK") {
            config.local_auth_fallback = parse_bool(&val);
        }

        if let Ok(val) = std::env::var("CARELINK_BOOTSTRAP_ADMIN") {
            match parse_bootstrap(&val) {
                Some(cred) => config.bootstrap_admin = Some(cred),
                None => {
                    tracing::warn!("Invalid CARELINK_BOOTSTRAP_ADMIN, expected user:pass");
                }
            }
        }

        config
    }
}

fn parse_bool(val: &str) -> bool {
    val == "true" || val == "1"
}

/// Parse a `user:pass` pair. The password may itself contain `:`.
fn parse_bootstrap(val: &str) -> Option<BootstrapAdmin> {
    let (username, password) = val.split_once(':')?;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some(BootstrapAdmin {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(15 * 60));
        assert!(!config.local_auth_fallback);
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_parse_bootstrap() {
        let cred = parse_bootstrap("CBarnett:Admin123").unwrap();
        assert_eq!(cred.username, "CBarnett");
        assert_eq!(cred.password, "Admin123");
    }

    #[test]
    fn test_parse_bootstrap_with_colon_in_password() {
        let cred = parse_bootstrap("admin:a:b:c").unwrap();
        assert_eq!(cred.username, "admin");
        assert_eq!(cred.password, "a:b:c");
    }

    #[test]
    fn test_parse_bootstrap_rejects_malformed() {
        assert!(parse_bootstrap("no-separator").is_none());
        assert!(parse_bootstrap(":missing-user").is_none());
        assert!(parse_bootstrap("missing-pass:").is_none());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("yes"));
    }
}
