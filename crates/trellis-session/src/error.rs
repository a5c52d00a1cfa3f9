//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The session could not be started: fingerprint inputs are missing or
    /// the store could not be opened. No session exists afterwards.
    #[error("Session initialization failed: {0}")]
    Init(String),

    #[error("Storage error: {0}")]
    Storage(#[from] trellis_storage::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
