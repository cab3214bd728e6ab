use thiserror::Error;

/// Structured failure returned by every public service operation.
///
/// Callers never see panics or raw transport errors: validation problems,
/// permission refusals and network failures all arrive through this enum so
/// the UI layer can render error state uniformly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    /// Bad or missing input (empty credentials, malformed role, ...).
    #[error("{0}")]
    Validation(String),

    /// The caller's role does not grant the required permission.
    #[error("Permission denied")]
    PermissionDenied,

    /// The operation requires an active, non-expired session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The operation requires the persistent socket to be connected.
    #[error("Transport not connected")]
    NotConnected,

    /// A correlated request expired without a response.
    #[error("Request timed out")]
    Timeout,

    /// Network unreachable, non-2xx response, or transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The referenced record does not exist.
    #[error("Record not found")]
    NotFound,

    /// System channels (`general`, `announcements`) cannot be deleted,
    /// renamed or left.
    #[error("System channels cannot be modified")]
    SystemChannel,
}

/// Convenience alias used by the service layer.
pub type OpResult<T> = Result<T, OpError>;
