//! # carelink-core
//!
//! The session and channel synchronization layer of the CareLink client:
//! authentication with inactivity expiry, a locally cached channel list
//! reconciled against server pushes, permission-gated admin operations,
//! and a rate-limited notification dispatcher.
//!
//! The crate is headless: it owns no UI and no global state. An embedding
//! application constructs a [`state::CoreContext`] at startup, spawns
//! [`bridge::run_bridge`] on the socket event stream, and renders from the
//! caches the services maintain.

pub mod admin;
pub mod bridge;
pub mod channels;
pub mod config;
pub mod events;
pub mod notify;
pub mod permissions;
pub mod session;
pub mod state;

pub use admin::AdminService;
pub use channels::{ChannelService, ChannelUpdate, NewChannel};
pub use config::{BootstrapAdmin, CoreConfig};
pub use events::{AuthEvent, ListenerId, LogoutReason};
pub use notify::{NotificationDispatcher, NotificationSink};
pub use session::{SessionManager, SessionStatus, SessionView};
pub use state::CoreContext;

use carelink_shared::OpError;
use carelink_transport::TransportError;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide tracing subscriber. Call once from the
/// embedding application's entry point.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("carelink_core=debug,carelink_transport=debug,carelink_store=info,warn")
    });
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Map a transport failure onto the service-level error taxonomy.
pub(crate) fn map_transport(e: TransportError) -> OpError {
    match e {
        TransportError::Timeout => OpError::Timeout,
        TransportError::NotConnected => OpError::NotConnected,
        TransportError::Refused(_) => OpError::SystemChannel,
        TransportError::Status { code: 401, message } | TransportError::Status { code: 403, message } => {
            OpError::Validation(message)
        }
        TransportError::Status { code: 404, .. } => OpError::NotFound,
        other => OpError::Transport(other.to_string()),
    }
}
