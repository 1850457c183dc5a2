//! The resident session and its persisted timeline.
//!
//! Every mutation persists the whole session while still holding the log
//! lock, so a read-modify-persist cycle always works on the latest log. A
//! failed write is reported to the caller; the in-memory change stands.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tabtime_core::{EngineConfig, Entry, Observation, Session, Submission, Timeline, TimelineStats};
use tabtime_db::KeyValueStore;

use crate::clock::Clock;
use crate::error::EngineError;

/// Owner of the session and its bounded, consolidated log.
pub struct TimelineStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    session: Mutex<Option<Session>>,
}

impl fmt::Debug for TimelineStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TimelineStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a fresh, empty session and persists it.
    pub fn initialize(&self) -> Result<Session, EngineError> {
        let session = Session::start(self.clock.now_millis())?;
        tracing::info!(session_id = %session.session_id, "starting new session");
        let mut resident = self.session();
        *resident = Some(session.clone());
        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Adopts the persisted session, if there is one.
    pub fn restore(&self) -> Result<bool, EngineError> {
        let Some(session) = self.store.load_session()? else {
            tracing::info!("no persisted session");
            return Ok(false);
        };
        tracing::info!(
            session_id = %session.session_id,
            entries = session.timeline.len(),
            "restored session"
        );
        *self.session() = Some(session);
        Ok(true)
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session().clone()
    }

    /// Merges an observation into the log, or prepends it as a new entry.
    ///
    /// Starts a session first when none is resident.
    pub fn submit_observation(&self, observation: Observation) -> Result<Entry, EngineError> {
        let now = self.clock.now_millis();
        let mut resident = self.session();
        let session = match resident.take() {
            Some(session) => session,
            None => {
                let session = Session::start(now)?;
                tracing::info!(
                    session_id = %session.session_id,
                    "no resident session, starting one"
                );
                session
            }
        };
        let session = resident.insert(session);

        let submission = session.timeline.submit(observation, now, &self.config);
        match &submission {
            Submission::Inserted(entry) => {
                tracing::info!(
                    domain = %entry.domain,
                    duration_ms = entry.duration,
                    "new timeline entry"
                );
            }
            Submission::Evicted(entry) => {
                tracing::debug!(
                    domain = %entry.domain,
                    timestamp = entry.timestamp,
                    "observation older than every retained entry, not kept"
                );
            }
            Submission::Merged(_) => {}
        }
        self.store.save_session(session)?;
        Ok(submission.into_entry())
    }

    /// Runs the sweep. Persists only when something merged.
    pub fn consolidate_entries(&self) -> Result<bool, EngineError> {
        let mut resident = self.session();
        let Some(session) = resident.as_mut() else {
            return Ok(false);
        };
        let merges = session.timeline.consolidate(self.config.sweep_gap_ms);
        if merges == 0 {
            return Ok(false);
        }
        tracing::info!(merges, entries = session.timeline.len(), "consolidated timeline");
        self.store.save_session(session)?;
        Ok(true)
    }

    /// Empties the log and persists. Does not start a new session.
    pub fn clear_timeline(&self) -> Result<(), EngineError> {
        let mut resident = self.session();
        let Some(session) = resident.as_mut() else {
            return Ok(());
        };
        let dropped = session.timeline.len();
        session.timeline.clear();
        tracing::info!(dropped, "cleared timeline");
        self.store.save_session(session)?;
        Ok(())
    }

    pub fn stats(&self) -> TimelineStats {
        self.session()
            .as_ref()
            .map(|session| session.timeline.stats())
            .unwrap_or_else(|| Timeline::new().stats())
    }

    /// Newest entry for `domain` that started within the recent window.
    pub fn find_recent_entry(&self, domain: &str) -> Option<Entry> {
        let now = self.clock.now_millis();
        self.session().as_ref().and_then(|session| {
            session
                .timeline
                .find_recent(domain, now, self.config.recent_window_ms)
                .cloned()
        })
    }
}
