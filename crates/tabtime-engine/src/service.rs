//! The background service: wiring, lifecycle and message dispatch.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tabtime_core::{EngineConfig, RecordingState, Settings};
use tabtime_db::KeyValueStore;

use crate::clock::{Clock, millis};
use crate::error::EngineError;
use crate::host::{Host, HostEvent};
use crate::protocol::{Message, Response};
use crate::scheduler::Scheduler;
use crate::snapshot::SnapshotService;
use crate::timeline::TimelineStore;
use crate::tracker::FocusTracker;

/// Time the host gets to settle after install before tracking starts.
const INSTALL_SETTLE: Duration = Duration::from_secs(1);

/// One engine instance: tracker, timeline, snapshots and timers.
pub struct BackgroundService<H: Host> {
    host: Arc<H>,
    store: Arc<dyn KeyValueStore>,
    config: EngineConfig,
    snapshots: Arc<SnapshotService<H>>,
    timeline: Arc<TimelineStore>,
    tracker: Arc<FocusTracker<H>>,
    scheduler: Mutex<Scheduler>,
}

impl<H: Host> fmt::Debug for BackgroundService<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<H: Host> BackgroundService<H> {
    pub fn new(
        host: Arc<H>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let snapshots = Arc::new(SnapshotService::new(host.clone(), clock.clone(), &config));
        let timeline = Arc::new(TimelineStore::new(store.clone(), clock.clone(), config.clone()));
        let tracker = Arc::new(FocusTracker::new(
            host.clone(),
            clock,
            snapshots.clone(),
            timeline.clone(),
            config.clone(),
        ));
        Self {
            host,
            store,
            config,
            snapshots,
            timeline,
            tracker,
            scheduler: Mutex::new(Scheduler::new()),
        }
    }

    pub fn tracker(&self) -> &FocusTracker<H> {
        &self.tracker
    }

    pub fn timeline(&self) -> &TimelineStore {
        &self.timeline
    }

    pub fn snapshots(&self) -> &SnapshotService<H> {
        &self.snapshots
    }

    /// Startup without timers: restore persisted state, start tracking the
    /// current surface and apply saved settings.
    pub async fn restore_state(&self) -> Result<(), EngineError> {
        match self.store.recording_state() {
            Ok(recording) => tracing::info!(
                is_recording = recording.is_recording,
                events = recording.events.len(),
                "loaded recording state"
            ),
            Err(err) => tracing::warn!(error = %err, "could not load recording state"),
        }

        match self.timeline.restore() {
            Ok(true) => {}
            Ok(false) => {
                self.timeline.initialize()?;
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not restore session, starting a fresh one");
                self.timeline.initialize()?;
            }
        }

        self.tracker.initialize_with_current().await?;

        match self.store.settings() {
            Ok(Some(settings)) => self.apply_settings(&settings),
            Ok(None) => tracing::debug!("no saved settings, using defaults"),
            Err(err) => tracing::warn!(error = %err, "could not load settings"),
        }
        Ok(())
    }

    /// Full startup: [`restore_state`](Self::restore_state) plus the
    /// periodic tasks.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.restore_state().await?;
        self.start_periodic_tasks();
        tracing::info!("background service started");
        Ok(())
    }

    fn start_periodic_tasks(&self) {
        let mut scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);

        let timeline = self.timeline.clone();
        scheduler.spawn_periodic(
            "consolidation",
            millis(self.config.consolidation_interval_ms),
            move || {
                let timeline = timeline.clone();
                async move {
                    if let Err(err) = timeline.consolidate_entries() {
                        tracing::warn!(error = %err, "consolidation sweep failed");
                    }
                }
            },
        );

        let tracker = self.tracker.clone();
        scheduler.spawn_periodic("watchdog", millis(self.config.watchdog_interval_ms), move || {
            let tracker = tracker.clone();
            async move { tracker.watchdog().await }
        });

        let tracker = self.tracker.clone();
        scheduler.spawn_periodic(
            "snapshot-refresh",
            millis(self.config.screenshot_update_interval_ms),
            move || {
                let tracker = tracker.clone();
                async move { tracker.refresh_stale_snapshot().await }
            },
        );

        let tracker = self.tracker.clone();
        scheduler.spawn_periodic(
            "periodic-save",
            millis(self.config.periodic_save_interval_ms),
            move || {
                let tracker = tracker.clone();
                async move {
                    if let Err(err) = tracker.checkpoint(false).await {
                        tracing::warn!(error = %err, "periodic save failed");
                    }
                }
            },
        );
    }

    /// Routes a host event to the tracker. Failures are logged.
    pub async fn handle_host_event(&self, event: HostEvent) {
        let result = match event {
            HostEvent::Activated(surface) => self.tracker.on_activated(surface).await,
            HostEvent::Updated(surface, hint) => self.tracker.on_updated(surface, &hint).await,
            HostEvent::Removed(surface) => self.tracker.on_removed(surface).await,
            HostEvent::WindowFocusChanged(window) => {
                self.tracker.on_window_focus_changed(window);
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "host event handling failed");
        }
    }

    /// Parses and handles a raw protocol request.
    pub async fn dispatch_value(&self, request: serde_json::Value) -> Response {
        match Message::from_value(request) {
            Ok(message) => self.dispatch(message).await,
            Err(response) => response,
        }
    }

    /// Handles one protocol message. Always produces exactly one reply.
    pub async fn dispatch(&self, message: Message) -> Response {
        tracing::debug!(action = message.action(), "handling message");
        if !self.tracker.is_initialized() {
            if let Err(err) = self.tracker.initialize_with_current().await {
                tracing::warn!(error = %err, "could not initialize tracking before message");
            }
        }
        let action = message.action();
        match self.handle(message).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(action, error = %err, "message handling failed");
                Response::error(err.to_string())
            }
        }
    }

    async fn handle(&self, message: Message) -> Result<Response, EngineError> {
        match message {
            Message::RecordingStarted => {
                self.store.save_recording_state(&RecordingState {
                    is_recording: true,
                    events: Vec::new(),
                    has_recording: false,
                })?;
                tracing::info!("recording started");
                Ok(Response::success())
            }
            Message::RecordingStopped { data } => {
                let events = data.unwrap_or_default();
                tracing::info!(events = events.len(), "recording stopped");
                self.store.save_recording_state(&RecordingState {
                    is_recording: false,
                    events,
                    has_recording: true,
                })?;
                Ok(Response::success())
            }
            Message::GetRecordingState => Ok(Response::Recording(self.store.recording_state()?)),
            Message::ClearRecording => {
                self.store.save_recording_state(&RecordingState::default())?;
                Ok(Response::success())
            }
            Message::GetTimelineData => {
                Ok(Response::timeline(self.timeline.current_session().as_ref()))
            }
            Message::ClearTimelineData => {
                self.reset_timeline().await?;
                Ok(Response::success())
            }
            Message::ForceRefreshActiveTab => {
                let active = self.host.active_surface(None).await?;
                let surface = active.ok_or(EngineError::NoActiveSurface)?;
                self.tracker.update_active_record(surface.id).await?;
                Ok(Response::success())
            }
            Message::UpdateSettings { settings } => {
                self.store.save_settings(&settings)?;
                self.apply_settings(&settings);
                Ok(Response::success())
            }
        }
    }

    /// Clears the log, starts a new session and re-bases tracking.
    pub async fn reset_timeline(&self) -> Result<(), EngineError> {
        self.timeline.clear_timeline()?;
        self.timeline.initialize()?;
        if self.tracker.active_record().is_some() {
            self.tracker.reset_start_time();
        } else {
            self.tracker.initialize_with_current().await?;
        }
        Ok(())
    }

    fn apply_settings(&self, settings: &Settings) {
        if let Some(enabled) = settings.screenshots_enabled() {
            self.snapshots.set_enabled(enabled);
        }
    }

    /// First install: wipe persisted state, start a session, then begin
    /// tracking once the host has settled.
    pub async fn on_installed(&self) -> Result<(), EngineError> {
        tracing::info!("installed, resetting state");
        self.store.clear_all()?;
        self.timeline.initialize()?;
        tokio::time::sleep(INSTALL_SETTLE).await;
        self.tracker.initialize_with_current().await?;
        Ok(())
    }

    /// Stops every timer, then force-saves the open record.
    pub async fn shutdown(&self) {
        let mut scheduler =
            std::mem::take(&mut *self.scheduler.lock().unwrap_or_else(PoisonError::into_inner));
        scheduler.shutdown().await;
        self.tracker.cancel_pending_capture();
        match self.tracker.save_current_entry(true).await {
            Ok(Some(entry)) => tracing::info!(domain = %entry.domain, "saved final record"),
            Ok(None) => tracing::debug!("nothing to save on shutdown"),
            Err(err) => tracing::warn!(error = %err, "final save failed"),
        }
    }
}
