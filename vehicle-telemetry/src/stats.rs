//! Lock-free service counters
//!
//! Producers and the dispatcher bump these from their own threads; operators
//! read a [`StatsSnapshot`] whenever they like.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TelemetryCounters {
    frames_received: AtomicU64,
    frames_decoded: AtomicU64,
    read_failures: AtomicU64,
    invalid_inputs: AtomicU64,
    battery_failures: AtomicU64,
    mutations_queued: AtomicU64,
    events_published: AtomicU64,
}

/// Counter values at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub read_failures: u64,
    pub invalid_inputs: u64,
    pub battery_failures: u64,
    pub mutations_queued: u64,
    pub events_published: u64,
}

impl TelemetryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_frames_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_read_failures(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_invalid_inputs(&self) {
        self.invalid_inputs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_battery_failures(&self) {
        self.battery_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_mutations_queued(&self) {
        self.mutations_queued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            invalid_inputs: self.invalid_inputs.load(Ordering::Relaxed),
            battery_failures: self.battery_failures.load(Ordering::Relaxed),
            mutations_queued: self.mutations_queued.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = TelemetryCounters::new();
        counters.inc_frames_received();
        counters.inc_frames_received();
        counters.inc_frames_decoded();
        counters.inc_read_failures();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.frames_decoded, 1);
        assert_eq!(snapshot.read_failures, 1);
        assert_eq!(snapshot.events_published, 0);
    }
}
