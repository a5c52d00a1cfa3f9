//! Session Manager
//!
//! Key/value access to one fingerprinted session. Every accessor except
//! `exists` is gated on the session being started and answers with a
//! sentinel rather than an error when it is not.

use chrono::Duration;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use trellis_storage::{SessionKey, SessionStore};

use crate::error::SessionError;
use crate::fingerprint::{fingerprint, store_id};
use crate::request::RequestContext;
use crate::snapshot::Snapshot;
use crate::Result;

struct SessionInner {
    /// Store id, fingerprint name and lifetime, fixed at construction
    key: SessionKey,
    started: RwLock<bool>,
    store: SessionStore,
}

pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Fingerprint the request and open (or resume) its session in `store`
    pub(crate) fn open(
        store: SessionStore,
        request: &RequestContext,
        id: Option<&str>,
        ttl_minutes: u32,
    ) -> Result<Self> {
        let (ip, user_agent) = request.fingerprint_inputs()?;
        let name = fingerprint(ip, user_agent, id);
        let session_id = store_id(&name);
        let key = SessionKey::new(
            session_id,
            name,
            Duration::seconds(i64::from(ttl_minutes) * 60),
        );

        let record = store
            .open(&key)
            .map_err(|e| SessionError::Init(format!("cannot open session store: {}", e)))?;

        tracing::info!(
            session_id = %key.id,
            ttl_minutes,
            expires_at = %record.expires_at,
            "Started session"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                key,
                started: RwLock::new(true),
                store,
            }),
        })
    }

    pub fn is_started(&self) -> bool {
        *self.inner.started.read()
    }

    pub fn id(&self) -> &str {
        &self.inner.key.id
    }

    pub fn name(&self) -> &str {
        &self.inner.key.name
    }

    pub fn ttl(&self) -> Duration {
        self.inner.key.ttl
    }

    /// Store `value` as JSON under `key`.
    ///
    /// Returns `Ok(false)` when the session is not started. A value that
    /// cannot be serialized is rejected before anything is written. Each
    /// write refreshes the session's expiry and recreates its store record
    /// if another request already collected it.
    pub fn set<T>(&self, key: &str, value: &T) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        if !self.is_started() {
            return Ok(false);
        }

        let encoded = serde_json::to_string(value)?;
        self.inner.store.put(&self.inner.key, key, &encoded)?;
        Ok(true)
    }

    /// Decode the value under `key`.
    ///
    /// `None` covers every failure: not started, missing key, a stored value
    /// that does not decode as `T`, or a storage error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_started() {
            return None;
        }

        let stored = match self.inner.store.fetch(self.id(), key) {
            Ok(stored) => stored?,
            Err(e) => {
                tracing::warn!(session_id = %self.inner.key.id, key, "Failed to read session key: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&stored) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(session_id = %self.inner.key.id, key, "Discarding undecodable value: {}", e);
                None
            }
        }
    }

    /// Whether `key` is present. Not gated on `is_started`.
    pub fn exists(&self, key: &str) -> bool {
        self.inner
            .store
            .contains(self.id(), key)
            .unwrap_or_else(|e| {
                tracing::warn!(session_id = %self.inner.key.id, key, "Failed to check session key: {}", e);
                false
            })
    }

    /// Remove `key`. Removing a key that is not there still succeeds.
    pub fn delete(&self, key: &str) -> Result<bool> {
        if !self.is_started() {
            return Ok(false);
        }

        self.inner.store.remove(self.id(), key)?;
        Ok(true)
    }

    pub fn delete_all(&self) -> Result<bool> {
        if !self.is_started() {
            return Ok(false);
        }

        let removed = self.inner.store.clear(self.id())?;
        tracing::debug!(session_id = %self.inner.key.id, removed, "Cleared session keys");
        Ok(true)
    }

    /// Every key, decoded. Unlike `get`, a value that does not decode is an error.
    pub fn get_all(&self) -> Result<HashMap<String, serde_json::Value>> {
        if !self.is_started() {
            return Ok(HashMap::new());
        }

        let mut values = HashMap::new();
        for (key, stored) in self.inner.store.entries(self.id())? {
            let value = serde_json::from_str(&stored)?;
            values.insert(key, value);
        }
        Ok(values)
    }

    /// Capture a snapshot, wipe the session and its store record, and stop it.
    ///
    /// Returns `Ok(None)` when the session is not started.
    pub fn destroy(&self) -> Result<Option<String>> {
        if !self.is_started() {
            return Ok(None);
        }

        // Read and delete in one transaction; on failure the session is untouched
        let entries = self.inner.store.take(self.id())?;
        *self.inner.started.write() = false;

        let snapshot = Snapshot::new(entries).encode()?;

        tracing::info!(session_id = %self.inner.key.id, "Destroyed session");

        Ok(Some(snapshot))
    }

    /// Replace the current keys with the contents of `snapshot`.
    ///
    /// A decoded snapshot replaces the keys in one transaction. A snapshot
    /// that fails to decode still clears the session and returns `Ok(false)`.
    pub fn restore(&self, snapshot: &str) -> Result<bool> {
        if !self.is_started() {
            return Ok(false);
        }

        let snapshot = match Snapshot::decode(snapshot) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.inner.store.clear(self.id())?;
                tracing::debug!(session_id = %self.inner.key.id, "Rejected snapshot: {}", e);
                return Ok(false);
            }
        };

        let restored = snapshot.len();
        self.inner
            .store
            .replace_all(&self.inner.key, &snapshot.into_entries())?;

        tracing::info!(session_id = %self.inner.key.id, restored, "Restored session");

        Ok(true)
    }

    /// Flush and stop the session without clearing its keys
    pub fn close(&self) -> Result<()> {
        let mut started = self.inner.started.write();
        if !*started {
            return Ok(());
        }

        *started = false;
        self.inner.store.touch(&self.inner.key)?;

        tracing::info!(session_id = %self.inner.key.id, "Closed session");

        Ok(())
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("id", &self.inner.key.id)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use trellis_storage::Database;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Cart {
        items: Vec<String>,
        total_cents: u64,
    }

    fn request() -> RequestContext {
        RequestContext::new("192.0.2.10".parse().unwrap(), "Mozilla/5.0")
    }

    fn manager() -> SessionManager {
        let store = SessionStore::new(Database::open_in_memory().unwrap());
        SessionManager::open(store, &request(), None, 720).unwrap()
    }

    #[test]
    fn test_set_get() {
        let session = manager();
        assert!(session.is_started());

        assert!(session.set("user", "alice").unwrap());
        assert_eq!(session.get::<String>("user"), Some("alice".to_string()));
        assert_eq!(session.get::<String>("missing"), None);

        let cart = Cart {
            items: vec!["book".to_string(), "pen".to_string()],
            total_cents: 1599,
        };
        session.set("cart", &cart).unwrap();
        assert_eq!(session.get::<Cart>("cart"), Some(cart));
    }

    #[test]
    fn test_unserializable_value_is_rejected() {
        let session = manager();
        let mut bad: HashMap<Vec<u8>, u8> = HashMap::new();
        bad.insert(vec![1, 2], 3);

        assert!(matches!(
            session.set("bad", &bad),
            Err(SessionError::Serialization(_))
        ));
        assert!(!session.exists("bad"));
    }

    #[test]
    fn test_get_swallows_decode_errors_but_get_all_does_not() {
        let session = manager();
        session.set("count", &3).unwrap();

        // Wrong target type
        assert_eq!(session.get::<Vec<String>>("count"), None);

        session
            .inner
            .store
            .put(&session.inner.key, "corrupt", "{not json")
            .unwrap();
        assert_eq!(session.get::<serde_json::Value>("corrupt"), None);
        assert!(matches!(
            session.get_all(),
            Err(SessionError::Serialization(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let session = manager();
        session.set("k", &1).unwrap();

        assert!(session.delete("k").unwrap());
        assert!(!session.exists("k"));
        assert!(session.delete("k").unwrap());
        assert!(session.delete("never-set").unwrap());
    }

    #[test]
    fn test_restore_replaces_keys() {
        let session = manager();
        session.set("stale", &true).unwrap();

        let snapshot = Snapshot::new([("a".to_string(), "1".to_string())])
            .encode()
            .unwrap();
        assert!(session.restore(&snapshot).unwrap());

        let all = session.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["a"], serde_json::json!(1));
    }

    #[test]
    fn test_restore_bad_snapshot_clears_and_fails() {
        let session = manager();
        session.set("a", &1).unwrap();

        assert!(!session.restore("garbage").unwrap());
        assert!(session.get_all().unwrap().is_empty());
        assert!(session.is_started());
    }

    #[test]
    fn test_close_keeps_keys() {
        let session = manager();
        session.set("a", &1).unwrap();

        session.close().unwrap();
        assert!(!session.is_started());
        assert!(session.exists("a"));
        assert_eq!(session.get::<i32>("a"), None);
        assert!(!session.set("b", &2).unwrap());

        // Second close is a no-op
        session.close().unwrap();
    }

    #[test]
    fn test_not_started_sentinels() {
        let session = manager();
        session.set("a", &1).unwrap();
        session.destroy().unwrap();

        assert!(!session.set("a", &1).unwrap());
        assert_eq!(session.get::<i32>("a"), None);
        assert!(!session.delete("a").unwrap());
        assert!(!session.delete_all().unwrap());
        assert!(session.get_all().unwrap().is_empty());
        assert!(session.destroy().unwrap().is_none());
        assert!(!session.restore("{}").unwrap());
    }

    #[test]
    fn test_exists_is_not_gated() {
        let session = manager();
        session.set("a", &1).unwrap();
        session.close().unwrap();

        // Store still holds the key; `exists` reports it even though reads are gated
        assert!(session.exists("a"));
        assert!(session.get::<i32>("a").is_none());
    }

    #[test]
    fn test_name_and_id() {
        let session = manager();
        let ip = "192.0.2.10".parse().unwrap();
        assert_eq!(session.name(), fingerprint(ip, "Mozilla/5.0", None));
        assert_eq!(session.id(), store_id(session.name()));
        assert_eq!(session.ttl(), Duration::minutes(720));
    }

    #[test]
    fn test_set_after_session_was_collected() {
        let db = Database::open_in_memory().unwrap();
        let session =
            SessionManager::open(SessionStore::new(db.clone()), &request(), None, 720).unwrap();
        session.set("k", &1).unwrap();

        // Another request's start collects this session once it looks expired
        let store = SessionStore::new(db);
        let mut expired = session.inner.key.clone();
        expired.ttl = Duration::minutes(-5);
        store.touch(&expired).unwrap();
        let other = RequestContext::new("192.0.2.99".parse().unwrap(), "curl/8.4.0");
        SessionManager::open(store.clone(), &other, None, 720).unwrap();
        assert!(store.record(session.id()).unwrap().is_none());

        assert!(session.set("k", &2).unwrap());
        assert_eq!(session.get::<i32>("k"), Some(2));
        assert!(session.exists("k"));
        let record = store.record(session.id()).unwrap().unwrap();
        assert!(!record.is_expired());
    }

    #[test]
    fn test_destroy_takes_entries_and_record() {
        let db = Database::open_in_memory().unwrap();
        let store = SessionStore::new(db.clone());
        let session = SessionManager::open(SessionStore::new(db), &request(), None, 720).unwrap();
        session.set("a", &1).unwrap();
        session.set("b", "two").unwrap();

        let snapshot = Snapshot::decode(&session.destroy().unwrap().unwrap()).unwrap();
        assert_eq!(snapshot.entries()["a"], "1");
        assert_eq!(snapshot.entries()["b"], "\"two\"");

        assert!(!session.is_started());
        assert!(store.record(session.id()).unwrap().is_none());
        assert!(store.entries(session.id()).unwrap().is_empty());
    }
}
