//! Trellis Core
//!
//! Application-level wiring: configuration, logging, and per-request
//! session scopes.

mod app;
mod config;
mod error;

pub use app::App;
pub use config::Config;
pub use error::CoreError;

// Re-export core components
pub use trellis_session::{
    RequestContext, SessionError, SessionManager, SessionScope, Snapshot, DEFAULT_TTL_MINUTES,
};
pub use trellis_storage::{Database, SessionStore, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
