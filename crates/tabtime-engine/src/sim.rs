//! Deterministic in-process host for tests and script replay.
//!
//! Each mutating method updates the simulated browser and returns the event
//! a real browser would deliver for it, so callers decide when (and whether)
//! the engine sees it.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tabtime_core::{SurfaceId, WindowId};

use crate::error::HostError;
use crate::host::{ChangeHint, Host, HostEvent, LoadStatus, SurfaceInfo};

#[derive(Debug, Default)]
struct SimState {
    surfaces: BTreeMap<SurfaceId, SurfaceInfo>,
    active: HashMap<WindowId, SurfaceId>,
    current_window: Option<WindowId>,
    captures: usize,
    failing: bool,
    capture_delay: Option<Duration>,
}

/// Scripted browser: surfaces, windows and focus held in memory.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    state: Mutex<SimState>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a loaded surface and makes it the active one of a focused window.
    pub fn open(&self, id: SurfaceId, window: WindowId, url: &str, title: &str) -> HostEvent {
        let mut state = self.state();
        state.surfaces.insert(
            id,
            SurfaceInfo {
                id,
                window_id: window,
                url: Some(url.to_string()),
                title: Some(title.to_string()),
                icon: None,
                status: LoadStatus::Complete,
            },
        );
        state.active.insert(window, id);
        state.current_window = Some(window);
        HostEvent::Activated(id)
    }

    /// Switches to an existing surface in its window.
    pub fn activate(&self, id: SurfaceId) -> HostEvent {
        let mut state = self.state();
        if let Some(window) = state.surfaces.get(&id).map(|surface| surface.window_id) {
            state.active.insert(window, id);
            state.current_window = Some(window);
        }
        HostEvent::Activated(id)
    }

    /// Starts a navigation; the surface is loading until [`loaded`](Self::loaded).
    pub fn navigate(&self, id: SurfaceId, url: &str, title: &str) -> HostEvent {
        let mut state = self.state();
        if let Some(surface) = state.surfaces.get_mut(&id) {
            surface.url = Some(url.to_string());
            surface.title = Some(title.to_string());
            surface.status = LoadStatus::Loading;
        }
        HostEvent::Updated(
            id,
            ChangeHint {
                url: Some(url.to_string()),
                status: Some(LoadStatus::Loading),
            },
        )
    }

    pub fn loaded(&self, id: SurfaceId) -> HostEvent {
        let mut state = self.state();
        if let Some(surface) = state.surfaces.get_mut(&id) {
            surface.status = LoadStatus::Complete;
        }
        HostEvent::Updated(
            id,
            ChangeHint {
                url: None,
                status: Some(LoadStatus::Complete),
            },
        )
    }

    /// Closes a surface. The window falls back to its highest-numbered
    /// remaining surface.
    pub fn close(&self, id: SurfaceId) -> HostEvent {
        let mut state = self.state();
        if let Some(closed) = state.surfaces.remove(&id) {
            let window = closed.window_id;
            if state.active.get(&window) == Some(&id) {
                let fallback = state
                    .surfaces
                    .values()
                    .rev()
                    .find(|surface| surface.window_id == window)
                    .map(|surface| surface.id);
                match fallback {
                    Some(next) => state.active.insert(window, next),
                    None => state.active.remove(&window),
                };
            }
        }
        HostEvent::Removed(id)
    }

    /// Every browser window loses focus.
    pub fn blur(&self) -> HostEvent {
        HostEvent::WindowFocusChanged(None)
    }

    pub fn focus(&self, window: WindowId) -> HostEvent {
        self.state().current_window = Some(window);
        HostEvent::WindowFocusChanged(Some(window))
    }

    /// Makes every query fail with [`HostError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    pub fn set_capture_delay(&self, delay: Option<Duration>) {
        self.state().capture_delay = delay;
    }

    /// Number of captures the host performed.
    pub fn capture_count(&self) -> usize {
        self.state().captures
    }
}

fn unavailable() -> HostError {
    HostError::Unavailable("scripted failure".to_string())
}

impl Host for ScriptedHost {
    fn surface(
        &self,
        id: SurfaceId,
    ) -> impl Future<Output = Result<SurfaceInfo, HostError>> + Send {
        let result = {
            let state = self.state();
            if state.failing {
                Err(unavailable())
            } else {
                state
                    .surfaces
                    .get(&id)
                    .cloned()
                    .ok_or(HostError::SurfaceNotFound(id))
            }
        };
        async move { result }
    }

    fn active_surface(
        &self,
        window: Option<WindowId>,
    ) -> impl Future<Output = Result<Option<SurfaceInfo>, HostError>> + Send {
        let result = {
            let state = self.state();
            if state.failing {
                Err(unavailable())
            } else {
                Ok(window
                    .or(state.current_window)
                    .and_then(|window| state.active.get(&window))
                    .and_then(|id| state.surfaces.get(id))
                    .cloned())
            }
        };
        async move { result }
    }

    fn capture_visible(
        &self,
        window: WindowId,
    ) -> impl Future<Output = Result<Option<String>, HostError>> + Send {
        let (result, delay) = {
            let mut state = self.state();
            if state.failing {
                (Err(unavailable()), None)
            } else {
                let active = state.active.get(&window).copied();
                if active.is_some() {
                    state.captures += 1;
                }
                let snapshot = active.map(|id| format!("data:image/jpeg;base64,snapshot-{id}"));
                (Ok(snapshot), state.capture_delay)
            }
        };
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }
}
