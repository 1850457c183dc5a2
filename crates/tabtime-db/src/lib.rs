//! Storage layer for the tab activity timeline.
//!
//! Persistence is a flat key/value store. Values are JSON documents; readers
//! treat absent keys (and explicit `null`) as defaults. A write of several
//! keys is applied atomically, but there is no other transactional guarantee.
//!
//! Two implementations of [`KeyValueStore`] are provided:
//! - [`Database`]: durable storage in SQLite via `rusqlite`
//! - [`MemoryStore`]: process-local storage for tests, with failure injection
//!
//! # Thread Safety
//!
//! [`Database`] wraps its `rusqlite::Connection` in a `Mutex`, so one instance
//! can be shared across tasks behind an `Arc`. Every call holds the lock only
//! for the duration of the statement.
//!
//! # Schema
//!
//! A single table `kv(key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at
//! TEXT NOT NULL)`. `updated_at` is ISO 8601 (e.g. `2024-01-15T10:30:00Z`).
//! There is no schema versioning for the stored documents.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tabtime_core::{RecordingState, Session, Settings};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored value could not be encoded or decoded.
    #[error("invalid value for key {key}: {source}")]
    Json {
        key: StorageKey,
        #[source]
        source: serde_json::Error,
    },
    /// The store refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// The keys this application persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    IsRecording,
    RecordedEvents,
    HasRecording,
    CurrentSession,
    ExtensionSettings,
}

impl StorageKey {
    /// Key name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IsRecording => "isRecording",
            Self::RecordedEvents => "recordedEvents",
            Self::HasRecording => "hasRecording",
            Self::CurrentSession => "currentSession",
            Self::ExtensionSettings => "extensionSettings",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn encode<T: Serialize>(key: StorageKey, value: &T) -> Result<Value, DbError> {
    serde_json::to_value(value).map_err(|source| DbError::Json { key, source })
}

fn decode<T: DeserializeOwned>(key: StorageKey, value: Value) -> Result<T, DbError> {
    serde_json::from_value(value).map_err(|source| DbError::Json { key, source })
}

/// Durable key/value persistence.
///
/// Implementors provide raw `get`/`set_many`; the typed accessors are shared.
pub trait KeyValueStore: Send + Sync {
    /// Reads one key. `Ok(None)` when the key is absent or `null`.
    fn get(&self, key: StorageKey) -> Result<Option<Value>, DbError>;

    /// Writes several keys as one atomic write.
    fn set_many(&self, values: &[(StorageKey, Value)]) -> Result<(), DbError>;

    /// Writes one key.
    fn set(&self, key: StorageKey, value: Value) -> Result<(), DbError> {
        self.set_many(&[(key, value)])
    }

    /// Loads the persisted session, if any.
    fn load_session(&self) -> Result<Option<Session>, DbError> {
        self.get(StorageKey::CurrentSession)?
            .map(|value| decode(StorageKey::CurrentSession, value))
            .transpose()
    }

    /// Persists the session as a unit.
    fn save_session(&self, session: &Session) -> Result<(), DbError> {
        let value = encode(StorageKey::CurrentSession, session)?;
        tracing::debug!(
            session_id = %session.session_id,
            entries = session.timeline.len(),
            "saving session"
        );
        self.set(StorageKey::CurrentSession, value)
    }

    /// Reads the recorder state, defaulting every absent key.
    fn recording_state(&self) -> Result<RecordingState, DbError> {
        let is_recording = self
            .get(StorageKey::IsRecording)?
            .map(|v| decode(StorageKey::IsRecording, v))
            .transpose()?
            .unwrap_or(false);
        let events = self
            .get(StorageKey::RecordedEvents)?
            .map(|v| decode(StorageKey::RecordedEvents, v))
            .transpose()?
            .unwrap_or_default();
        let has_recording = self
            .get(StorageKey::HasRecording)?
            .map(|v| decode(StorageKey::HasRecording, v))
            .transpose()?
            .unwrap_or(false);
        Ok(RecordingState {
            is_recording,
            events,
            has_recording,
        })
    }

    /// Writes the recorder state's three keys together.
    fn save_recording_state(&self, state: &RecordingState) -> Result<(), DbError> {
        self.set_many(&[
            (StorageKey::IsRecording, Value::Bool(state.is_recording)),
            (StorageKey::RecordedEvents, Value::Array(state.events.clone())),
            (StorageKey::HasRecording, Value::Bool(state.has_recording)),
        ])
    }

    /// Loads user settings, if any were saved.
    fn settings(&self) -> Result<Option<Settings>, DbError> {
        self.get(StorageKey::ExtensionSettings)?
            .map(|value| decode(StorageKey::ExtensionSettings, value))
            .transpose()
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), DbError> {
        let value = encode(StorageKey::ExtensionSettings, settings)?;
        self.set(StorageKey::ExtensionSettings, value)
    }

    /// Resets recorder state and drops the session. Settings survive.
    fn clear_all(&self) -> Result<(), DbError> {
        self.set_many(&[
            (StorageKey::IsRecording, Value::Bool(false)),
            (StorageKey::RecordedEvents, Value::Array(Vec::new())),
            (StorageKey::HasRecording, Value::Bool(false)),
            (StorageKey::CurrentSession, Value::Null),
        ])
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// SQLite-backed store.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        lock(&self.conn).execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Lists stored keys with their last update time, ordered by key.
    pub fn list_keys(&self) -> Result<Vec<(String, String)>, DbError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare("SELECT key, updated_at FROM kv ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: StorageKey) -> Result<Option<Value>, DbError> {
        let raw: Option<String> = lock(&self.conn)
            .query_row(
                "SELECT value FROM kv WHERE key = ?",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let value: Value =
            serde_json::from_str(&raw).map_err(|source| DbError::Json { key, source })?;
        Ok((!value.is_null()).then_some(value))
    }

    fn set_many(&self, values: &[(StorageKey, Value)]) -> Result<(), DbError> {
        if values.is_empty() {
            return Ok(());
        }
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE
                    SET value = excluded.value, updated_at = excluded.updated_at
                ",
            )?;
            for (key, value) in values {
                let raw = serde_json::to_string(value)
                    .map_err(|source| DbError::Json { key: *key, source })?;
                stmt.execute(params![key.as_str(), raw, updated_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-memory store with write counting and failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StorageKey, Value>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set_many` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every following write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<Value>, DbError> {
        Ok(lock(&self.values)
            .get(&key)
            .filter(|value| !value.is_null())
            .cloned())
    }

    fn set_many(&self, values: &[(StorageKey, Value)]) -> Result<(), DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("writes disabled".to_string()));
        }
        let mut stored = lock(&self.values);
        for (key, value) in values {
            stored.insert(*key, value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tabtime_core::{EngineConfig, Observation};

    fn sample_session() -> Session {
        let mut session = Session::start(1_736_931_600_000).unwrap();
        session.timeline.submit(
            Observation::new("x.com", 1_000, 9_000).with_title("X"),
            9_000,
            &EngineConfig::default(),
        );
        session
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert!(db.list_keys().unwrap().is_empty());
    }

    #[test]
    fn absent_keys_read_as_defaults() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.recording_state().unwrap(), RecordingState::default());
        assert!(db.load_session().unwrap().is_none());
        assert!(db.settings().unwrap().is_none());
    }

    #[test]
    fn session_survives_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tabtime.db");
        let session = sample_session();
        {
            let db = Database::open(&path).unwrap();
            db.save_session(&session).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_session().unwrap(), Some(session));
    }

    #[test]
    fn clear_all_drops_session_and_recording_but_keeps_settings() {
        let db = Database::open_in_memory().unwrap();
        db.save_session(&sample_session()).unwrap();
        db.save_recording_state(&RecordingState {
            is_recording: true,
            events: vec![json!({"type": "click"})],
            has_recording: true,
        })
        .unwrap();
        db.save_settings(&Settings {
            disable_screenshots: Some(true),
            ..Settings::default()
        })
        .unwrap();

        db.clear_all().unwrap();

        assert!(db.load_session().unwrap().is_none());
        assert_eq!(db.recording_state().unwrap(), RecordingState::default());
        assert_eq!(
            db.settings().unwrap().and_then(|s| s.disable_screenshots),
            Some(true)
        );
    }

    #[test]
    fn set_many_overwrites_existing_keys() {
        let db = Database::open_in_memory().unwrap();
        db.set(StorageKey::IsRecording, json!(true)).unwrap();
        db.set(StorageKey::IsRecording, json!(false)).unwrap();
        assert_eq!(db.get(StorageKey::IsRecording).unwrap(), Some(json!(false)));
        let keys: Vec<_> = db.list_keys().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["isRecording".to_string()]);
    }

    #[test]
    fn malformed_session_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.set(StorageKey::CurrentSession, json!({"timeline": 5})).unwrap();
        let err = db.load_session().unwrap_err();
        assert!(matches!(
            err,
            DbError::Json {
                key: StorageKey::CurrentSession,
                ..
            }
        ));
    }

    #[test]
    fn memory_store_counts_writes_and_injects_failures() {
        let store = MemoryStore::new();
        store.save_session(&sample_session()).unwrap();
        assert_eq!(store.write_count(), 1);

        store.set_fail_writes(true);
        assert!(matches!(
            store.save_session(&sample_session()),
            Err(DbError::Unavailable(_))
        ));
        assert_eq!(store.write_count(), 1);
        assert!(store.load_session().unwrap().is_some());
    }
}
