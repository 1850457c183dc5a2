//! Active-tab time accounting.
//!
//! An [`ActiveRecord`] tracks one domain at a time. Live time is measured from
//! `last_active_time` while `is_active` is set; paused spans are folded into
//! `accumulated_ms`. Total elapsed time at any instant is
//! `accumulated_ms + (is_active ? now - last_active_time : 0)`.

use serde::{Deserialize, Serialize};

use crate::entry::Observation;
use crate::types::{Millis, SurfaceId, WindowId};

/// The single live accounting unit for the focused domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRecord {
    pub surface_id: SurfaceId,
    pub window_id: WindowId,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub icon: Option<String>,
    pub snapshot: Option<String>,
    /// When tracking of this domain began.
    pub start_time: Millis,
    /// Live time already banked from earlier spans.
    pub accumulated_ms: Millis,
    /// Start of the current live span.
    pub last_active_time: Millis,
    pub is_active: bool,
    /// Active time already handed to the timeline by earlier saves.
    #[serde(default)]
    pub handed_off_ms: Millis,
    /// Distinguishes this record from the ones it replaced or will replace.
    pub generation: u64,
}

/// Metadata needed to open a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTarget {
    pub surface_id: SurfaceId,
    pub window_id: WindowId,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub icon: Option<String>,
}

impl ActiveRecord {
    /// Opens a fresh, active record at `now` with nothing accumulated.
    pub fn open(target: RecordTarget, now: Millis, generation: u64) -> Self {
        Self {
            surface_id: target.surface_id,
            window_id: target.window_id,
            url: target.url,
            domain: target.domain,
            title: target.title,
            icon: target.icon,
            snapshot: None,
            start_time: now,
            accumulated_ms: 0,
            last_active_time: now,
            is_active: true,
            handed_off_ms: 0,
            generation,
        }
    }

    /// Live time in the current span; zero while paused.
    pub fn live_ms(&self, now: Millis) -> Millis {
        if self.is_active {
            (now - self.last_active_time).max(0)
        } else {
            0
        }
    }

    /// Total elapsed active time.
    pub fn elapsed_ms(&self, now: Millis) -> Millis {
        self.accumulated_ms + self.live_ms(now)
    }

    /// Banks the current live span and restarts it at `now`.
    ///
    /// Leaves `is_active` unchanged.
    pub fn fold(&mut self, now: Millis) {
        if self.is_active {
            self.accumulated_ms += self.live_ms(now);
            self.last_active_time = now;
        }
    }

    /// Stops counting live time. No-op when already paused.
    pub fn pause(&mut self, now: Millis) {
        if self.is_active {
            self.fold(now);
            self.is_active = false;
        }
    }

    /// Starts counting live time from `now`. No-op when already active.
    pub fn resume(&mut self, now: Millis) {
        if !self.is_active {
            self.is_active = true;
            self.last_active_time = now;
        }
    }

    /// Refreshes volatile metadata for the same domain and keeps counting.
    pub fn refresh(&mut self, target: RecordTarget, now: Millis) {
        self.fold(now);
        self.surface_id = target.surface_id;
        self.window_id = target.window_id;
        self.url = target.url;
        self.title = target.title;
        self.icon = target.icon;
        self.last_active_time = now;
        self.is_active = true;
    }

    /// Restarts accounting at `now`, forgetting all earlier time.
    pub fn rebase(&mut self, now: Millis) {
        self.start_time = now;
        self.accumulated_ms = 0;
        self.last_active_time = now;
        self.handed_off_ms = 0;
    }

    /// Records that everything elapsed up to `now` was handed off, so the
    /// next [`observation`](Self::observation) only covers later time.
    pub fn commit(&mut self, now: Millis) {
        self.handed_off_ms += self.elapsed_ms(now);
        self.start_time = now;
        self.accumulated_ms = 0;
        self.last_active_time = now;
    }

    /// Whether the unsaved time is worth handing off.
    ///
    /// The minimum duration applies to the record's whole life: once part of
    /// it was handed off, any further active time qualifies.
    pub fn is_due(&self, now: Millis, min_duration_ms: Millis, force: bool) -> bool {
        let pending = self.elapsed_ms(now);
        force || (pending > 0 && pending + self.handed_off_ms >= min_duration_ms)
    }

    /// Stores a captured snapshot. Empty captures never replace a stored one.
    pub fn set_snapshot(&mut self, snapshot: Option<String>) -> bool {
        match snapshot {
            Some(snapshot) if !snapshot.is_empty() => {
                self.snapshot = Some(snapshot);
                true
            }
            _ => false,
        }
    }

    /// The observation this record represents at `now`.
    pub fn observation(&self, now: Millis) -> Observation {
        Observation {
            id: None,
            timestamp: Some(self.start_time),
            end_time: now,
            duration: self.elapsed_ms(now),
            url: self.url.clone(),
            domain: self.domain.clone(),
            title: self.title.clone(),
            icon: self.icon.clone(),
            snapshot: self.snapshot.clone(),
        }
    }
}
