//! Request-scoped session slot
//!
//! A `SessionScope` belongs to one request-handling context and holds at most
//! one live `SessionManager`. The first `start` opens the session; later calls
//! hand back the same manager. Dropping the scope closes the session.

use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;

use trellis_storage::{Database, SessionStore};

use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::request::RequestContext;
use crate::Result;

/// Session lifetime used when the caller does not pick one (12 hours)
pub const DEFAULT_TTL_MINUTES: u32 = 720;

enum Storage {
    /// Not opened yet; opened on the first `start`
    Directory(PathBuf),
    Open(Database),
}

pub struct SessionScope {
    request: RequestContext,
    storage: Mutex<Storage>,
    default_ttl_minutes: u32,
    current: RwLock<Option<SessionManager>>,
}

impl SessionScope {
    /// Scope whose sessions live in `storage_dir`, created on first start if absent
    pub fn new(storage_dir: impl Into<PathBuf>, request: RequestContext) -> Self {
        Self::with_storage(Storage::Directory(storage_dir.into()), request)
    }

    /// Scope over an already opened database
    pub fn with_database(db: Database, request: RequestContext) -> Self {
        Self::with_storage(Storage::Open(db), request)
    }

    fn with_storage(storage: Storage, request: RequestContext) -> Self {
        Self {
            request,
            storage: Mutex::new(storage),
            default_ttl_minutes: DEFAULT_TTL_MINUTES,
            current: RwLock::new(None),
        }
    }

    pub fn with_default_ttl(mut self, ttl_minutes: u32) -> Self {
        self.default_ttl_minutes = ttl_minutes;
        self
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Start the session with no caller id and the scope's default TTL
    pub fn start_default(&self) -> Result<SessionManager> {
        self.start(None, self.default_ttl_minutes)
    }

    /// Start the session, or return the one already live in this scope.
    ///
    /// Once a session is live, `id` and `ttl_minutes` are ignored until it
    /// is destroyed or closed.
    pub fn start(&self, id: Option<&str>, ttl_minutes: u32) -> Result<SessionManager> {
        let mut current = self.current.write();

        if let Some(manager) = current.as_ref().filter(|m| m.is_started()) {
            tracing::debug!(
                session_id = %manager.id(),
                requested_id = ?id,
                requested_ttl_minutes = ttl_minutes,
                "Session already started; ignoring start arguments"
            );
            return Ok(manager.clone());
        }

        if ttl_minutes == 0 {
            return Err(SessionError::Init(
                "session TTL must be at least one minute".to_string(),
            ));
        }

        // Fail before touching the filesystem when there is nothing to fingerprint
        self.request.fingerprint_inputs()?;

        let db = self.database()?;
        let manager = SessionManager::open(SessionStore::new(db), &self.request, id, ttl_minutes)?;
        *current = Some(manager.clone());

        Ok(manager)
    }

    /// The live session, if any
    pub fn current(&self) -> Option<SessionManager> {
        self.current
            .read()
            .as_ref()
            .filter(|m| m.is_started())
            .cloned()
    }

    /// Flush and release the live session, keeping its keys
    pub fn close(&self) -> Result<()> {
        let manager = self.current.write().take();
        match manager {
            Some(manager) => manager.close(),
            None => Ok(()),
        }
    }

    fn database(&self) -> Result<Database> {
        let mut storage = self.storage.lock();

        let db = match &*storage {
            Storage::Open(db) => return Ok(db.clone()),
            Storage::Directory(dir) => Database::open_in_dir(dir).map_err(|e| {
                SessionError::Init(format!(
                    "cannot open session storage at {}: {}",
                    dir.display(),
                    e
                ))
            })?,
        };

        *storage = Storage::Open(db.clone());
        Ok(db)
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close session on scope teardown: {}", e);
        }
    }
}
