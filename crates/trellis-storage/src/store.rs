//! Session store
//!
//! Key/value rows addressed by session id. Values are opaque text; callers
//! own the encoding.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Identity and lifetime of one session row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub id: String,
    pub name: String,
    pub ttl: Duration,
}

impl SessionKey {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ttl,
        }
    }
}

pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or resume the session, pushing its expiry to now + `ttl`.
    /// Expired sessions are purged first, so a stale record never resumes.
    pub fn open(&self, session: &SessionKey) -> Result<SessionRecord> {
        let now = Utc::now();

        self.db.transaction(|conn| {
            let purged = purge_expired_with(conn, now.timestamp())?;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired sessions");
            }

            upsert_session(conn, session, now)?;

            let record = load_record(conn, &session.id)?;
            Ok(record.unwrap_or_else(|| SessionRecord {
                id: session.id.clone(),
                name: session.name.clone(),
                created_at: now,
                accessed_at: now,
                expires_at: from_timestamp((now + session.ttl).timestamp()),
            }))
        })
    }

    /// Refresh access time and expiry without touching data
    pub fn touch(&self, session: &SessionKey) -> Result<()> {
        self.db
            .with_connection(|conn| upsert_session(conn, session, Utc::now()))
    }

    pub fn record(&self, id: &str) -> Result<Option<SessionRecord>> {
        self.db.with_connection(|conn| load_record(conn, id))
    }

    /// Write one entry. The session row is recreated if it was purged and
    /// its expiry is refreshed.
    pub fn put(&self, session: &SessionKey, key: &str, value: &str) -> Result<()> {
        let now = Utc::now();
        self.db.transaction(|conn| {
            upsert_session(conn, session, now)?;
            conn.execute(
                "INSERT OR REPLACE INTO session_data (session_id, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![session.id, key, value, now.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Swap every entry of the session for `entries` in one transaction
    pub fn replace_all(&self, session: &SessionKey, entries: &[(String, String)]) -> Result<()> {
        let now = Utc::now();
        self.db.transaction(|conn| {
            upsert_session(conn, session, now)?;
            conn.execute(
                "DELETE FROM session_data WHERE session_id = ?1",
                [&session.id],
            )?;

            let mut stmt = conn.prepare(
                "INSERT INTO session_data (session_id, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let updated_at = now.to_rfc3339();
            for (key, value) in entries {
                stmt.execute(rusqlite::params![session.id, key, value, updated_at])?;
            }
            Ok(())
        })
    }

    /// Read every entry and delete the session in one transaction.
    /// Nothing is removed if any step fails.
    pub fn take(&self, id: &str) -> Result<Vec<(String, String)>> {
        self.db.transaction(|conn| {
            let entries = load_entries(conn, id)?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(entries)
        })
    }

    pub fn fetch(&self, id: &str, key: &str) -> Result<Option<String>> {
        self.db.with_connection(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM session_data WHERE session_id = ?1 AND key = ?2",
                    [id, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    pub fn contains(&self, id: &str, key: &str) -> Result<bool> {
        self.db.with_connection(|conn| {
            let found: Option<i32> = conn
                .query_row(
                    "SELECT 1 FROM session_data WHERE session_id = ?1 AND key = ?2",
                    [id, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns whether a row was removed
    pub fn remove(&self, id: &str, key: &str) -> Result<bool> {
        self.db.with_connection(|conn| {
            let removed = conn.execute(
                "DELETE FROM session_data WHERE session_id = ?1 AND key = ?2",
                [id, key],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn clear(&self, id: &str) -> Result<usize> {
        self.db.with_connection(|conn| {
            let removed = conn.execute("DELETE FROM session_data WHERE session_id = ?1", [id])?;
            Ok(removed)
        })
    }

    /// All entries of a session, ordered by key
    pub fn entries(&self, id: &str) -> Result<Vec<(String, String)>> {
        self.db.with_connection(|conn| load_entries(conn, id))
    }

    /// Remove the session record; its data cascades
    pub fn drop_session(&self, id: &str) -> Result<bool> {
        self.db.with_connection(|conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        self.db.with_connection(|conn| purge_expired_with(conn, now))
    }
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

fn upsert_session(conn: &Connection, session: &SessionKey, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, name, created_at, accessed_at, expires_at)
         VALUES (?1, ?2, ?3, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET accessed_at = ?3, expires_at = ?4",
        rusqlite::params![
            session.id,
            session.name,
            now.to_rfc3339(),
            (now + session.ttl).timestamp()
        ],
    )?;
    Ok(())
}

fn load_entries(conn: &Connection, id: &str) -> Result<Vec<(String, String)>> {
    let mut stmt =
        conn.prepare("SELECT key, value FROM session_data WHERE session_id = ?1 ORDER BY key")?;
    let entries = stmt
        .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
    Ok(entries)
}

fn purge_expired_with(conn: &Connection, now: i64) -> Result<usize> {
    let purged = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now])?;
    Ok(purged)
}

fn load_record(conn: &Connection, id: &str) -> Result<Option<SessionRecord>> {
    let record = conn
        .query_row(
            "SELECT id, name, created_at, accessed_at, expires_at FROM sessions WHERE id = ?1",
            [id],
            |row| {
                let created_str: String = row.get(2)?;
                let accessed_str: String = row.get(3)?;

                Ok(SessionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_rfc3339(&created_str),
                    accessed_at: parse_rfc3339(&accessed_str),
                    expires_at: from_timestamp(row.get(4)?),
                })
            },
        )
        .optional()?;
    Ok(record)
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}
