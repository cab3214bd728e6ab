//! # carelink-store
//!
//! Durable local storage for the CareLink client, backed by SQLite.
//!
//! The crate exposes a synchronous [`Store`] handle wrapping a
//! `rusqlite::Connection` with typed helpers for session persistence, the
//! channel cache, the local-fallback user list, namespaced settings, and an
//! append-only audit log with retention trimming and CSV export.

pub mod audit;
pub mod channels;
pub mod database;
pub mod kv;
pub mod migrations;
pub mod models;
pub mod session;
pub mod settings;
pub mod users;

mod error;

pub use database::Store;
pub use error::{Result, StoreError};
pub use models::*;
