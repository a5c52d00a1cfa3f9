//! Application state container
//!
//! Owns the configuration and hands each request its own session scope.

use trellis_session::{RequestContext, SessionScope};
use trellis_storage::{Database, SessionStore};

use crate::config::Config;
use crate::Result;

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            session_dir = %config.session_dir.display(),
            session_ttl_minutes = config.session_ttl_minutes,
            "Application configured"
        );

        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fresh session scope for one request
    pub fn session_scope(&self, request: RequestContext) -> SessionScope {
        SessionScope::new(self.config.session_dir.clone(), request)
            .with_default_ttl(self.config.session_ttl_minutes)
    }

    /// Run `f` with a session scope for `request` and close the session afterwards.
    ///
    /// The session is closed even when `f` fails; `f`'s error wins over a
    /// close error.
    pub fn with_session<F, T>(&self, request: RequestContext, f: F) -> Result<T>
    where
        F: FnOnce(&SessionScope) -> Result<T>,
    {
        let scope = self.session_scope(request);
        let result = f(&scope);
        let closed = scope.close();

        let value = result?;
        closed?;
        Ok(value)
    }

    /// Remove every expired session from storage
    pub fn purge_expired_sessions(&self) -> Result<usize> {
        let db = Database::open_in_dir(&self.config.session_dir)?;
        let purged = SessionStore::new(db).purge_expired()?;

        tracing::info!(purged, "Purged expired sessions");

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;

    fn app(dir: &std::path::Path) -> App {
        App::new(Config::new(dir.join("sessions"))).unwrap()
    }

    fn request() -> RequestContext {
        RequestContext::new("192.0.2.77".parse().unwrap(), "Mozilla/5.0")
    }

    #[test]
    fn test_requests_share_session_by_fingerprint() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(tmp.path());

        app.with_session(request(), |scope| {
            let session = scope.start_default()?;
            session.set("user", "alice")?;
            Ok(())
        })
        .unwrap();

        let user = app
            .with_session(request(), |scope| {
                Ok(scope.start_default()?.get::<String>("user"))
            })
            .unwrap();
        assert_eq!(user, Some("alice".to_string()));

        let other = app
            .with_session(
                RequestContext::new("192.0.2.78".parse().unwrap(), "Mozilla/5.0"),
                |scope| Ok(scope.start_default()?.get::<String>("user")),
            )
            .unwrap();
        assert_eq!(other, None);
    }

    #[test]
    fn test_scope_uses_configured_ttl() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::new(tmp.path().join("sessions"));
        config.session_ttl_minutes = 45;
        let app = App::new(config).unwrap();

        let scope = app.session_scope(request());
        let session = scope.start_default().unwrap();
        assert_eq!(session.ttl().num_minutes(), 45);
    }

    #[test]
    fn test_with_session_propagates_init_error() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(tmp.path());

        let err = app
            .with_session(RequestContext::detached(), |scope| {
                scope.start_default()?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Session(trellis_session::SessionError::Init(_))
        ));
    }

    #[test]
    fn test_purge_expired_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(tmp.path());

        app.with_session(request(), |scope| {
            scope.start_default()?.set("k", &1)?;
            Ok(())
        })
        .unwrap();

        // Nothing has expired yet
        assert_eq!(app.purge_expired_sessions().unwrap(), 0);
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut config = Config::new(std::path::PathBuf::from("sessions"));
        config.session_ttl_minutes = 0;
        assert!(matches!(App::new(config), Err(CoreError::Config(_))));
    }
}
