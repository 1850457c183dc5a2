//! Messages exchanged with the foreground UI.
//!
//! Requests are JSON objects tagged by `action`. Every request gets exactly
//! one reply: `{"status":"success"}`, a data payload, or `{"error": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tabtime_core::{RecordingState, Session, Settings};

/// A request from the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    RecordingStarted,
    RecordingStopped {
        #[serde(default)]
        data: Option<Vec<Value>>,
    },
    GetRecordingState,
    ClearRecording,
    GetTimelineData,
    ClearTimelineData,
    ForceRefreshActiveTab,
    UpdateSettings {
        settings: Settings,
    },
}

impl Message {
    /// Parses a raw request, naming the offending action on failure.
    pub fn from_value(value: Value) -> Result<Self, Response> {
        let action = match value.get("action") {
            Some(Value::String(action)) => action.clone(),
            Some(other) => other.to_string(),
            None => "<missing>".to_string(),
        };
        serde_json::from_value(value).map_err(|err| {
            tracing::debug!(%action, error = %err, "rejected message");
            Response::error(format!("unrecognized action: {action}"))
        })
    }

    /// The wire name of this message's action.
    pub const fn action(&self) -> &'static str {
        match self {
            Self::RecordingStarted => "recordingStarted",
            Self::RecordingStopped { .. } => "recordingStopped",
            Self::GetRecordingState => "getRecordingState",
            Self::ClearRecording => "clearRecording",
            Self::GetTimelineData => "getTimelineData",
            Self::ClearTimelineData => "clearTimelineData",
            Self::ForceRefreshActiveTab => "forceRefreshActiveTab",
            Self::UpdateSettings { .. } => "updateSettings",
        }
    }
}

/// A reply to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Status { status: String },
    Recording(RecordingState),
    Timeline { session: Value },
    Error { error: String },
}

impl Response {
    pub fn success() -> Self {
        Self::Status {
            status: "success".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// The timeline payload; an empty shape when no session is resident.
    pub fn timeline(session: Option<&Session>) -> Self {
        let session = session
            .and_then(|session| serde_json::to_value(session).ok())
            .unwrap_or_else(|| json!({ "sessionId": null, "timeline": [] }));
        Self::Timeline { session }
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
