//! Core domain logic for the tab activity timeline.
//!
//! This crate contains the fundamental types and logic for:
//! - Focus accounting: the single active record and its elapsed time
//! - Consolidation: merging observations into a bounded, de-duplicated timeline
//! - URL rules: domain extraction, trackability and capturability

pub mod config;
pub mod entry;
pub mod focus;
pub mod session;
pub mod timeline;
pub mod types;
pub mod urls;

pub use config::EngineConfig;
pub use entry::{Entry, EntryPhase, Observation};
pub use focus::{ActiveRecord, RecordTarget};
pub use session::{RecordingState, Session, Settings};
pub use timeline::{Submission, Timeline, TimelineStats};
pub use types::{EntryId, Millis, SessionId, SurfaceId, ValidationError, WindowId};
