//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

use crate::types::Millis;

/// Configuration for time accounting, consolidation and background tasks.
///
/// All values are in milliseconds except `max_timeline_entries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of entries kept in the timeline. Oldest are evicted.
    /// Default: 100.
    pub max_timeline_entries: usize,

    /// Observations shorter than this are dropped unless forced.
    /// Default: 5000 (5 seconds).
    pub min_duration_to_save_ms: Millis,

    /// Period of the consolidation sweep.
    /// Default: 60000 (1 minute).
    pub consolidation_interval_ms: Millis,

    /// A record open longer than this gets its snapshot refreshed.
    /// Also the period of the refresh task. Default: 120000 (2 minutes).
    pub screenshot_update_interval_ms: Millis,

    /// Period of the checkpointing save of the open record. 0 disables it.
    /// Default: 300000 (5 minutes).
    pub periodic_save_interval_ms: Millis,

    /// Period of the idle-domain watchdog. Default: 60000 (1 minute).
    pub watchdog_interval_ms: Millis,

    /// How far back a new observation may look for an entry to merge into.
    /// Default: 7200000 (2 hours).
    pub recent_window_ms: Millis,

    /// Maximum distance between an entry's end and an observation's start
    /// for the two to be merged on submit. Default: 600000 (10 minutes).
    pub gap_threshold_ms: Millis,

    /// Maximum gap between adjacent entries merged by the sweep.
    /// Default: 30000 (30 seconds).
    pub sweep_gap_ms: Millis,

    /// Delay between a focus transition and the snapshot attempt.
    /// Default: 500.
    pub snapshot_delay_ms: Millis,

    /// Minimum time between two throttled captures. Default: 3000.
    pub snapshot_throttle_ms: Millis,

    /// Upper bound on a single capture. Default: 5000.
    pub capture_timeout_ms: Millis,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_timeline_entries: 100,
            min_duration_to_save_ms: 5_000,
            consolidation_interval_ms: 60_000,
            screenshot_update_interval_ms: 120_000,
            periodic_save_interval_ms: 300_000,
            watchdog_interval_ms: 60_000,
            recent_window_ms: 2 * 60 * 60 * 1000,
            gap_threshold_ms: 10 * 60 * 1000,
            sweep_gap_ms: 30_000,
            snapshot_delay_ms: 500,
            snapshot_throttle_ms: 3_000,
            capture_timeout_ms: 5_000,
        }
    }
}
