//! Runtime side of the tab activity timeline.
//!
//! Wires the core accounting and consolidation logic to a host environment,
//! persistent storage, best-effort snapshots and periodic timers:
//! - [`FocusTracker`]: reacts to host events and emits observations
//! - [`TimelineStore`]: owns the resident session and persists every change
//! - [`BackgroundService`]: lifecycle, timers and protocol dispatch
//!
//! # Concurrency
//!
//! Everything runs on tokio. Shared state sits behind `std::sync::Mutex`es
//! that are never held across an `.await`.

pub mod clock;
pub mod error;
pub mod host;
pub mod protocol;
pub mod scheduler;
pub mod service;
pub mod sim;
pub mod snapshot;
pub mod timeline;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, HostError};
pub use host::{ChangeHint, Host, HostEvent, LoadStatus, SurfaceInfo};
pub use protocol::{Message, Response};
pub use scheduler::Scheduler;
pub use service::BackgroundService;
pub use sim::ScriptedHost;
pub use snapshot::SnapshotService;
pub use timeline::TimelineStore;
pub use tracker::FocusTracker;
