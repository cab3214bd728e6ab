//! # carelink-transport
//!
//! The two transports the CareLink core talks through:
//!
//! - **Transport A**: a persistent socket speaking newline-delimited JSON
//!   frames, run by a background tokio task with command/event mpsc
//!   channels and request/response correlation by `messageId`.
//! - **Transport B**: an HTTP request/response fallback ([`RestClient`])
//!   used for authentication, admin operations, and as the secondary path
//!   for channel writes when the socket fails.

pub mod correlation;
pub mod link;
pub mod rest;
pub mod socket;

mod error;

pub use correlation::PendingRequests;
pub use error::TransportError;
pub use link::ChannelLink;
pub use rest::{AdminApi, AuthApi, AuthSession, ChannelApi, NewUser, RestClient, UserUpdate};
pub use socket::{spawn_socket, LinkEvent, SocketConfig, SocketHandle};
