//! Timeline entries and the observations that feed them.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::{EntryId, Millis};

/// A candidate time span for one domain, produced by focus tracking.
///
/// `duration` is the actively viewed time inside the span, which can be
/// shorter than `end_time - timestamp` when the window lost focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Pre-assigned ID; one is generated on insert if missing.
    pub id: Option<EntryId>,
    /// Start of the span; defaults to the submission time if missing.
    pub timestamp: Option<Millis>,
    pub end_time: Millis,
    pub duration: Millis,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub icon: Option<String>,
    pub snapshot: Option<String>,
}

impl Observation {
    /// Creates an observation whose active duration equals its wall span.
    pub fn new(domain: impl Into<String>, timestamp: Millis, end_time: Millis) -> Self {
        Self {
            id: None,
            timestamp: Some(timestamp),
            end_time,
            duration: (end_time - timestamp).max(0),
            url: String::new(),
            domain: domain.into(),
            title: String::new(),
            icon: None,
            snapshot: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Millis) -> Self {
        self.duration = duration.max(0);
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Whether an entry can still absorb new observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPhase {
    /// Within the recent window and the gap threshold of now.
    Open,
    /// Outside the merge window; only the sweep may still touch it.
    Closed,
}

/// A persisted, possibly consolidated span of activity on one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    /// Start of the first observation folded into this entry.
    pub timestamp: Millis,
    /// End of the last observation. Older data may lack it; see [`Entry::end`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Millis>,
    /// Wall-clock span, `end_time - timestamp`.
    #[serde(default)]
    pub duration: Millis,
    /// Sum of the active durations of every folded observation.
    #[serde(default)]
    pub active_duration: Millis,
    #[serde(default)]
    pub url: String,
    pub domain: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "favicon", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, rename = "screenshot", skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

/// Returns the value if it is present and non-empty.
fn non_empty(value: Option<&String>) -> Option<&String> {
    value.filter(|v| !v.is_empty())
}

impl Entry {
    /// Builds a new entry from an observation.
    pub fn from_observation(observation: Observation, now: Millis) -> Self {
        let timestamp = observation.timestamp.unwrap_or(now);
        let end_time = observation.end_time.max(timestamp);
        Self {
            id: observation.id.unwrap_or_else(EntryId::generate),
            timestamp,
            end_time: Some(end_time),
            duration: end_time - timestamp,
            active_duration: observation.duration,
            url: observation.url,
            domain: observation.domain,
            title: observation.title,
            icon: observation.icon.filter(|v| !v.is_empty()),
            snapshot: observation.snapshot.filter(|v| !v.is_empty()),
        }
    }

    /// End of the entry, falling back to `timestamp + duration`.
    pub const fn end(&self) -> Millis {
        match self.end_time {
            Some(end) => end,
            None => self.timestamp + self.duration,
        }
    }

    /// Classifies the entry relative to `now`.
    pub fn phase(&self, now: Millis, config: &EngineConfig) -> EntryPhase {
        let recent = self.timestamp >= now - config.recent_window_ms;
        let near = now - self.end() < config.gap_threshold_ms;
        if recent && near {
            EntryPhase::Open
        } else {
            EntryPhase::Closed
        }
    }

    /// Folds a continuing observation into this entry.
    ///
    /// The span only grows, in either direction; the observation's non-empty
    /// metadata wins.
    pub fn absorb(&mut self, observation: &Observation) {
        let end = self.end().max(observation.end_time);
        if let Some(start) = observation.timestamp {
            self.timestamp = self.timestamp.min(start);
        }
        self.end_time = Some(end);
        self.duration = end - self.timestamp;
        self.active_duration += observation.duration;
        if !observation.title.is_empty() {
            self.title.clone_from(&observation.title);
        }
        if !observation.url.is_empty() {
            self.url.clone_from(&observation.url);
        }
        if let Some(snapshot) = non_empty(observation.snapshot.as_ref()) {
            self.snapshot = Some(snapshot.clone());
        }
        if let Some(icon) = non_empty(observation.icon.as_ref()) {
            self.icon = Some(icon.clone());
        }
    }

    /// Folds the chronologically next entry into this one during a sweep.
    ///
    /// Keeps the longer title and never drops an existing snapshot or icon.
    pub fn absorb_adjacent(&mut self, next: Self) {
        let end = self.end().max(next.end());
        self.end_time = Some(end);
        self.duration = end - self.timestamp;
        self.active_duration += next.active_duration;
        if next.title.len() > self.title.len() {
            self.title = next.title;
        }
        if non_empty(self.snapshot.as_ref()).is_none() {
            self.snapshot = next.snapshot.filter(|v| !v.is_empty());
        }
        if non_empty(self.icon.as_ref()).is_none() {
            self.icon = next.icon.filter(|v| !v.is_empty());
        }
    }
}
