//! # carelink-shared
//!
//! Types shared by every CareLink crate: the domain model (users, roles,
//! channels, messages), the JSON wire protocol spoken over the persistent
//! socket, the message encryption provider, and common error types.

pub mod constants;
pub mod crypto;
pub mod protocol;
pub mod types;

mod error;

pub use crypto::{CipherMethod, EncryptedEnvelope, EncryptionInfo, EncryptionProvider};
pub use error::{OpError, OpResult};
pub use protocol::{ClientFrame, ServerFrame};
pub use types::*;
