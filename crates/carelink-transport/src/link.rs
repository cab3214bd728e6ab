//! The seam between the channel service and Transport A.

use std::future::Future;
use std::time::Duration;

use carelink_shared::protocol::{ClientFrame, ServerFrame};
use carelink_shared::types::LinkStatus;

use crate::error::TransportError;

/// Message-oriented transport as seen by the service layer.
///
/// Production code uses [`crate::SocketHandle`]; tests substitute mocks
/// (typically with call counters) to verify gating behavior.
pub trait ChannelLink: Send + Sync {
    /// Current connection state.
    fn status(&self) -> LinkStatus;

    /// Issue a correlated request and await the matching response.
    fn request(
        &self,
        frame: ClientFrame,
        timeout: Duration,
    ) -> impl Future<Output = Result<ServerFrame, TransportError>> + Send;

    /// Fire-and-acknowledge send without correlation.
    fn send(&self, frame: ClientFrame) -> impl Future<Output = Result<(), TransportError>> + Send;
}
