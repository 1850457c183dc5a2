//! Focus tracking: turns host events into timeline observations.
//!
//! The tracker owns at most one [`ActiveRecord`]. A domain change closes the
//! current record and hands its observation to the [`TimelineStore`]; same
//! domain navigation only refreshes metadata. Window blur and focus pause and
//! resume the clock without emitting anything.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; every step re-reads the record after a suspension point and
//! checks its `generation` before applying late results.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tabtime_core::{ActiveRecord, EngineConfig, Entry, Millis, SurfaceId, WindowId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, millis};
use crate::error::EngineError;
use crate::host::{ChangeHint, Host, SurfaceInfo};
use crate::snapshot::SnapshotService;
use crate::timeline::TimelineStore;

#[derive(Debug, Default)]
struct TrackerState {
    record: Option<ActiveRecord>,
    next_generation: u64,
    pending_capture: Option<PendingCapture>,
    initialized: bool,
}

#[derive(Debug)]
struct PendingCapture {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TrackerState {
    fn cancel_pending_capture(&mut self) {
        if let Some(pending) = self.pending_capture.take() {
            pending.token.cancel();
        }
    }
}

fn lock(state: &Mutex<TrackerState>) -> MutexGuard<'_, TrackerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stores `snapshot` on the record if it is still the one it was taken for.
fn apply_snapshot(
    state: &Mutex<TrackerState>,
    generation: u64,
    url: &str,
    snapshot: Option<String>,
) -> bool {
    let mut state = lock(state);
    match state.record.as_mut() {
        Some(record) if record.generation == generation && record.url == url => {
            record.set_snapshot(snapshot)
        }
        _ => {
            tracing::debug!(generation, "record changed during capture, discarding snapshot");
            false
        }
    }
}

/// What an update did to the record.
enum Transition {
    Refreshed,
    Opened,
    Replaced(Box<ActiveRecord>),
}

/// The single active-record state machine.
#[derive(Debug)]
pub struct FocusTracker<H> {
    host: Arc<H>,
    clock: Arc<dyn Clock>,
    snapshots: Arc<SnapshotService<H>>,
    timeline: Arc<TimelineStore>,
    config: EngineConfig,
    state: Arc<Mutex<TrackerState>>,
}

impl<H: Host> FocusTracker<H> {
    pub fn new(
        host: Arc<H>,
        clock: Arc<dyn Clock>,
        snapshots: Arc<SnapshotService<H>>,
        timeline: Arc<TimelineStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            host,
            clock,
            snapshots,
            timeline,
            config,
            state: Arc::new(Mutex::new(TrackerState::default())),
        }
    }

    /// A copy of the current record.
    pub fn active_record(&self) -> Option<ActiveRecord> {
        lock(&self.state).record.clone()
    }

    /// Whether tracking was started from the host's current surface.
    pub fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    pub async fn on_activated(&self, surface: SurfaceId) -> Result<(), EngineError> {
        tracing::debug!(%surface, "surface activated");
        self.update_active_record(surface).await
    }

    /// Reacts to navigations and load completions of the tracked surface.
    pub async fn on_updated(
        &self,
        surface: SurfaceId,
        hint: &ChangeHint,
    ) -> Result<(), EngineError> {
        if !hint.is_relevant() {
            return Ok(());
        }
        let tracked = lock(&self.state)
            .record
            .as_ref()
            .is_some_and(|record| record.surface_id == surface);
        if !tracked {
            return Ok(());
        }
        tracing::debug!(
            %surface,
            url = ?hint.url,
            status = ?hint.status,
            "tracked surface updated"
        );
        self.update_active_record(surface).await
    }

    /// Closes out the record when its surface goes away, then looks for the
    /// surface that took its place.
    pub async fn on_removed(&self, surface: SurfaceId) -> Result<(), EngineError> {
        let generation = {
            let state = lock(&self.state);
            match state.record.as_ref() {
                Some(record) if record.surface_id == surface => record.generation,
                _ => return Ok(()),
            }
        };
        tracing::debug!(%surface, "tracked surface removed");

        let saved = self.hand_off(false, "removal").await;
        {
            let mut state = lock(&self.state);
            if state.record.as_ref().is_some_and(|record| record.generation == generation) {
                state.record = None;
                state.cancel_pending_capture();
            }
        }
        self.initialize_with_current().await?;
        saved.map(|_| ())
    }

    /// `None` pauses the clock, `Some` resumes it. Redundant calls are no-ops.
    pub fn on_window_focus_changed(&self, window: Option<WindowId>) {
        let now = self.clock.now_millis();
        let mut state = lock(&self.state);
        let Some(record) = state.record.as_mut() else {
            return;
        };
        match window {
            None => {
                record.pause(now);
                tracing::debug!(
                    domain = %record.domain,
                    accumulated_ms = record.accumulated_ms,
                    "browser lost focus"
                );
            }
            Some(window) => {
                record.resume(now);
                tracing::debug!(domain = %record.domain, %window, "browser regained focus");
            }
        }
    }

    /// Re-reads `surface` from the host and moves the record accordingly.
    ///
    /// Host failures and untrackable surfaces leave the record untouched.
    pub async fn update_active_record(&self, surface: SurfaceId) -> Result<(), EngineError> {
        let info = match self.host.surface(surface).await {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(%surface, error = %err, "could not resolve surface");
                return Ok(());
            }
        };
        let Some(target) = info.record_target() else {
            tracing::debug!(%surface, url = ?info.url, "surface not trackable");
            return Ok(());
        };

        let now = self.clock.now_millis();
        let transition = {
            let mut state = lock(&self.state);
            let generation = state.next_generation;
            let same_domain = state
                .record
                .as_ref()
                .map(|record| record.domain == target.domain);
            match same_domain {
                Some(true) => {
                    if let Some(record) = state.record.as_mut() {
                        record.refresh(target, now);
                    }
                    Transition::Refreshed
                }
                Some(false) => {
                    state.cancel_pending_capture();
                    state.next_generation += 1;
                    let fresh = ActiveRecord::open(target, now, generation);
                    tracing::info!(domain = %fresh.domain, "tracking new domain");
                    state
                        .record
                        .replace(fresh)
                        .map_or(Transition::Opened, |previous| {
                            Transition::Replaced(Box::new(previous))
                        })
                }
                None => {
                    state.next_generation += 1;
                    let fresh = ActiveRecord::open(target, now, generation);
                    tracing::info!(domain = %fresh.domain, "tracking started");
                    state.record = Some(fresh);
                    Transition::Opened
                }
            }
        };

        let result = match transition {
            Transition::Replaced(previous) => self.close_replaced(*previous, now).await.map(|_| ()),
            Transition::Refreshed | Transition::Opened => Ok(()),
        };
        self.schedule_capture();
        result
    }

    /// Submits the observation of a record that was just replaced.
    async fn close_replaced(
        &self,
        mut previous: ActiveRecord,
        now: Millis,
    ) -> Result<Option<Entry>, EngineError> {
        if previous.snapshot.is_none() {
            let snapshot = self
                .snapshots
                .capture(previous.surface_id, previous.window_id, &previous.url)
                .await;
            previous.set_snapshot(snapshot);
        }
        let observation = previous.observation(now);
        if !previous.is_due(now, self.config.min_duration_to_save_ms, false) {
            tracing::debug!(
                domain = %previous.domain,
                duration_ms = observation.duration,
                handed_off_ms = previous.handed_off_ms,
                "observation below minimum duration, dropped"
            );
            return Ok(None);
        }
        tracing::debug!(
            domain = %previous.domain,
            duration_ms = observation.duration,
            "domain changed, saving previous record"
        );
        self.timeline.submit_observation(observation).map(Some)
    }

    /// Schedules a delayed, throttled capture for the current record.
    fn schedule_capture(&self) {
        let mut state = lock(&self.state);
        state.cancel_pending_capture();
        let Some((generation, surface, window, url)) = state.record.as_ref().map(|record| {
            (
                record.generation,
                record.surface_id,
                record.window_id,
                record.url.clone(),
            )
        }) else {
            return;
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let delay = millis(self.config.snapshot_delay_ms);
        let snapshots = Arc::clone(&self.snapshots);
        let tracker_state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            let snapshot = snapshots.capture_throttled(surface, window, &url).await;
            if cancelled.is_cancelled() {
                return;
            }
            if apply_snapshot(&tracker_state, generation, &url, snapshot) {
                tracing::debug!(%surface, generation, "snapshot stored");
            }
        });
        state.pending_capture = Some(PendingCapture { token, handle });
    }

    /// Waits for the pending deferred capture, if any, to finish.
    pub async fn settle(&self) {
        let handle = lock(&self.state)
            .pending_capture
            .take()
            .map(|pending| pending.handle);
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::debug!(error = %err, "deferred capture did not complete");
            }
        }
    }

    pub fn cancel_pending_capture(&self) {
        lock(&self.state).cancel_pending_capture();
    }

    /// Hands the open record's unsaved time to the timeline.
    ///
    /// Returns `None` when there is no record, the record lacks a domain or
    /// URL, or its time is below the minimum duration and `force` is not set.
    /// The record is re-based afterwards, so repeated saves only report time
    /// accrued since the previous one and the gap rule stitches them into one
    /// entry.
    pub async fn save_current_entry(&self, force: bool) -> Result<Option<Entry>, EngineError> {
        self.hand_off(force, "save").await
    }

    /// Periodic save; see [`save_current_entry`](Self::save_current_entry).
    pub async fn checkpoint(&self, force: bool) -> Result<Option<Entry>, EngineError> {
        self.hand_off(force, "checkpoint").await
    }

    async fn hand_off(
        &self,
        force: bool,
        reason: &'static str,
    ) -> Result<Option<Entry>, EngineError> {
        let now = self.clock.now_millis();
        let Some(record) = self.active_record() else {
            return Ok(None);
        };
        if record.domain.is_empty() || record.url.is_empty() {
            return Ok(None);
        }
        if !record.is_due(now, self.config.min_duration_to_save_ms, force) {
            tracing::debug!(
                domain = %record.domain,
                elapsed_ms = record.elapsed_ms(now),
                handed_off_ms = record.handed_off_ms,
                min_ms = self.config.min_duration_to_save_ms,
                reason,
                "not saving record below minimum duration"
            );
            return Ok(None);
        }

        if record.snapshot.is_none() && record.is_active {
            let snapshot = self
                .snapshots
                .capture_throttled(record.surface_id, record.window_id, &record.url)
                .await;
            apply_snapshot(&self.state, record.generation, &record.url, snapshot);
        }

        let observation = {
            let mut state = lock(&self.state);
            let Some(current) = state
                .record
                .as_mut()
                .filter(|current| current.generation == record.generation)
            else {
                tracing::debug!(domain = %record.domain, "record replaced while saving, skipping");
                return Ok(None);
            };
            let observation = current.observation(now);
            current.commit(now);
            observation
        };

        tracing::debug!(
            domain = %observation.domain,
            duration_ms = observation.duration,
            force,
            reason,
            "saving current record"
        );
        self.timeline.submit_observation(observation).map(Some)
    }

    /// Starts tracking the host's active surface in the current window.
    ///
    /// Returns whether a trackable surface was found.
    pub async fn initialize_with_current(&self) -> Result<bool, EngineError> {
        let active = match self.host.active_surface(None).await {
            Ok(active) => active,
            Err(err) => {
                tracing::warn!(error = %err, "could not query active surface");
                return Ok(false);
            }
        };
        let Some(SurfaceInfo { id, url, .. }) = active else {
            tracing::debug!("no active surface in current window");
            return Ok(false);
        };
        if !url.as_deref().is_some_and(tabtime_core::urls::is_trackable_url) {
            tracing::debug!(surface = %id, ?url, "active surface not trackable");
            return Ok(false);
        }

        self.update_active_record(id).await?;
        lock(&self.state).initialized = true;
        Ok(true)
    }

    /// Restarts the record's accounting at now, e.g. after a timeline reset.
    pub fn reset_start_time(&self) {
        let now = self.clock.now_millis();
        if let Some(record) = lock(&self.state).record.as_mut() {
            record.rebase(now);
            tracing::debug!(domain = %record.domain, "record start time reset");
        }
    }

    /// Recaptures the snapshot of a record open longer than the refresh
    /// interval.
    pub async fn refresh_stale_snapshot(&self) {
        let now = self.clock.now_millis();
        let Some(record) = self.active_record() else {
            return;
        };
        if now - record.start_time <= self.config.screenshot_update_interval_ms {
            return;
        }
        tracing::debug!(domain = %record.domain, "refreshing snapshot of long-lived record");
        let snapshot = self
            .snapshots
            .capture_throttled(record.surface_id, record.window_id, &record.url)
            .await;
        apply_snapshot(&self.state, record.generation, &record.url, snapshot);
    }

    /// Re-initializes when nothing is tracked, otherwise logs the record.
    pub async fn watchdog(&self) {
        if self.active_record().is_some() {
            self.log_current_state();
            return;
        }
        tracing::debug!("no active record, re-initializing tracking");
        if let Err(err) = self.initialize_with_current().await {
            tracing::warn!(error = %err, "re-initializing tracking failed");
        }
    }

    pub fn log_current_state(&self) {
        let now = self.clock.now_millis();
        let state = lock(&self.state);
        let Some(record) = state.record.as_ref() else {
            tracing::debug!("no active record");
            return;
        };
        tracing::debug!(
            domain = %record.domain,
            title = %record.title,
            accumulated_ms = record.accumulated_ms,
            live_ms = record.live_ms(now),
            total_ms = record.elapsed_ms(now),
            is_active = record.is_active,
            has_snapshot = record.snapshot.is_some(),
            "current record"
        );
    }
}
