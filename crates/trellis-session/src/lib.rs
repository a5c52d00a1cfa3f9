//! Trellis Session Management
//!
//! - One live session per request scope, named by a fingerprint of the
//!   client IP, user agent and an optional caller id
//! - Values are stored as JSON and decoded on read
//! - Reads and writes on a session that is not started return a sentinel
//!   (`false`, `None`, empty map) instead of failing
//! - `destroy` hands back a snapshot that `restore` can load into a fresh session

mod error;
mod fingerprint;
mod manager;
mod request;
mod scope;
mod snapshot;

pub use error::SessionError;
pub use fingerprint::{fingerprint, store_id, FINGERPRINT_PREFIX, FINGERPRINT_SEPARATOR};
pub use manager::SessionManager;
pub use request::RequestContext;
pub use scope::{SessionScope, DEFAULT_TTL_MINUTES};
pub use snapshot::Snapshot;

pub type Result<T> = std::result::Result<T, SessionError>;
