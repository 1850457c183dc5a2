//! Timeline consolidation.
//!
//! The timeline is a bounded log of [`Entry`] values kept newest-first.
//! Two mechanisms keep one browsing session on one domain from fragmenting
//! into many entries:
//!
//! 1. **Submit-time merge**: a new observation continues the newest entry for
//!    the same domain that started within the recent window (2h) and whose end
//!    lies within the gap threshold (10min) of the observation's start.
//! 2. **Sweep**: a periodic corrective pass that sorts the log by start time
//!    and merges adjacent same-domain entries separated by less than the sweep
//!    gap (30s).
//!
//! The recent window and the gap threshold are independent checks; an entry
//! must pass both to absorb an observation.

use std::cmp::Reverse;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::entry::{Entry, Observation};
use crate::types::Millis;

/// Outcome of submitting an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The observation extended an existing entry.
    Merged(Entry),
    /// The observation became a new entry.
    Inserted(Entry),
    /// The observation became a new entry older than everything retained,
    /// and the log bound dropped it right away.
    Evicted(Entry),
}

impl Submission {
    /// The resulting entry, whichever way it was produced.
    pub const fn entry(&self) -> &Entry {
        match self {
            Self::Merged(entry) | Self::Inserted(entry) | Self::Evicted(entry) => entry,
        }
    }

    pub fn into_entry(self) -> Entry {
        match self {
            Self::Merged(entry) | Self::Inserted(entry) | Self::Evicted(entry) => entry,
        }
    }
}

/// Aggregate figures over the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStats {
    pub total_entries: usize,
    pub total_duration: Millis,
    pub unique_domains: usize,
    pub average_duration: f64,
}

/// Ordered, bounded log of timeline entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    entries: Vec<Entry>,
}

impl Timeline {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Merges an observation into a continuing entry or inserts a new one.
    pub fn submit(
        &mut self,
        observation: Observation,
        now: Millis,
        config: &EngineConfig,
    ) -> Submission {
        let start = observation.timestamp.unwrap_or(now);
        let recent_cutoff = now - config.recent_window_ms;

        let continuing = self.entries.iter().position(|existing| {
            existing.domain == observation.domain
                && existing.timestamp >= recent_cutoff
                && (existing.end() - start).abs() < config.gap_threshold_ms
        });

        if let Some(index) = continuing {
            let entry = &mut self.entries[index];
            entry.absorb(&observation);
            tracing::debug!(
                domain = %entry.domain,
                entry_id = %entry.id,
                duration_ms = entry.duration,
                active_ms = entry.active_duration,
                "merged observation into existing entry"
            );
            return Submission::Merged(entry.clone());
        }

        let entry = Entry::from_observation(observation, now);
        tracing::debug!(
            domain = %entry.domain,
            entry_id = %entry.id,
            duration_ms = entry.duration,
            "created timeline entry"
        );
        self.entries.insert(0, entry.clone());
        self.evict_overflow(config.max_timeline_entries);
        if self.entries.iter().any(|kept| kept.id == entry.id) {
            Submission::Inserted(entry)
        } else {
            Submission::Evicted(entry)
        }
    }

    /// Drops the oldest entries (by start time) beyond `max_entries`.
    fn evict_overflow(&mut self, max_entries: usize) {
        while self.entries.len() > max_entries {
            let Some((oldest, _)) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(index, entry)| (entry.timestamp, Reverse(*index)))
            else {
                break;
            };
            let evicted = self.entries.remove(oldest);
            tracing::debug!(
                domain = %evicted.domain,
                entry_id = %evicted.id,
                "evicted timeline entry"
            );
        }
    }

    /// Sweeps the log for fragmented sessions and merges them.
    ///
    /// Works on a sorted copy and only replaces the log when something merged,
    /// in which case the log is written back newest-first. Returns the number
    /// of merges performed.
    pub fn consolidate(&mut self, sweep_gap_ms: Millis) -> usize {
        if self.entries.len() < 2 {
            return 0;
        }

        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        for entry in &mut sorted {
            if entry.end_time.is_none() {
                entry.end_time = Some(entry.end());
            }
        }

        let mut merges = 0;
        let mut i = 0;
        while i + 1 < sorted.len() {
            let current = &sorted[i];
            let next = &sorted[i + 1];
            if current.domain == next.domain
                && (next.timestamp - current.end()).abs() < sweep_gap_ms
            {
                let next = sorted.remove(i + 1);
                tracing::debug!(
                    domain = %next.domain,
                    kept = %sorted[i].id,
                    absorbed = %next.id,
                    "sweep merged adjacent entries"
                );
                sorted[i].absorb_adjacent(next);
                merges += 1;
                // Re-check the grown entry against its new neighbour.
            } else {
                i += 1;
            }
        }

        if merges > 0 {
            sorted.reverse();
            self.entries = sorted;
        }
        merges
    }

    /// Newest entry for `domain` that started within the recent window.
    pub fn find_recent(
        &self,
        domain: &str,
        now: Millis,
        recent_window_ms: Millis,
    ) -> Option<&Entry> {
        let cutoff = now - recent_window_ms;
        self.entries
            .iter()
            .find(|entry| entry.domain == domain && entry.timestamp >= cutoff)
    }

    /// Derived figures; no side effects.
    pub fn stats(&self) -> TimelineStats {
        let total_entries = self.entries.len();
        let total_duration: Millis = self.entries.iter().map(|entry| entry.duration).sum();
        let unique_domains = self
            .entries
            .iter()
            .map(|entry| entry.domain.as_str())
            .collect::<HashSet<_>>()
            .len();
        #[expect(
            clippy::cast_precision_loss,
            reason = "durations and counts are far below f64 precision limits"
        )]
        let average_duration = if total_entries == 0 {
            0.0
        } else {
            total_duration as f64 / total_entries as f64
        };

        TimelineStats {
            total_entries,
            total_duration,
            unique_domains,
            average_duration,
        }
    }
}

impl From<Vec<Entry>> for Timeline {
    fn from(entries: Vec<Entry>) -> Self {
        Self { entries }
    }
}
