use thiserror::Error;

/// Errors produced by either transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A correlated request expired without a response.
    #[error("Request timed out")]
    Timeout,

    /// The socket is not currently connected.
    #[error("Transport not connected")]
    NotConnected,

    /// The socket task has shut down or the connection dropped mid-request.
    #[error("Connection closed")]
    Closed,

    /// The frame type does not carry a correlation id.
    #[error("Frame has no correlation id")]
    MissingCorrelation,

    /// Frame (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP-level failure (network unreachable, body decode, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-2xx response from the REST API.
    #[error("Server returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The client refused to issue the request.
    #[error("Refused: {0}")]
    Refused(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}
