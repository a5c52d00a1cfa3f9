//! Trellis Storage Layer
//!
//! SQLite-backed persistence for session data.
//! Each session is a row in `sessions`; its keys live in `session_data`
//! and cascade away with it.

mod database;
mod error;
mod migrations;
mod store;

pub use database::Database;
pub use error::StorageError;
pub use store::{SessionKey, SessionRecord, SessionStore};

pub type Result<T> = std::result::Result<T, StorageError>;
