//! The resident session and the small persisted documents next to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::timeline::Timeline;
use crate::types::{Millis, SessionId, ValidationError};

/// A tracking session: an identifier, its creation time and its timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    #[serde(default)]
    pub timeline: Timeline,
    #[serde(default)]
    pub start_time: Millis,
}

impl Session {
    /// Starts an empty session at `now`.
    pub fn start(now: Millis) -> Result<Self, ValidationError> {
        Ok(Self {
            session_id: SessionId::from_millis(now)?,
            timeline: Timeline::new(),
            start_time: now,
        })
    }
}

/// State of the separate interaction recorder, as exposed over the protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub is_recording: bool,
    pub events: Vec<Value>,
    pub has_recording: bool,
}

/// User-facing settings.
///
/// Only `disableScreenshots` is interpreted; anything else the UI stores is
/// kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_screenshots: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    /// Whether captures should run under these settings.
    pub fn screenshots_enabled(&self) -> Option<bool> {
        self.disable_screenshots.map(|disabled| !disabled)
    }
}
