//! Counters describing cache activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Activity counters for a [`Cache`](crate::Cache).
///
/// Updated with relaxed ordering; values are monotonic but not synchronized
/// with each other.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Write calls admitted (`write` and `write_multi`).
    pub writes_accepted: AtomicU64,
    /// Write calls rejected for capacity.
    pub writes_rejected: AtomicU64,
    /// Samples admitted.
    pub points_written: AtomicU64,
    /// Snapshots taken.
    pub snapshots_taken: AtomicU64,
    /// Snapshots released.
    pub snapshots_released: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the number of accepted write calls.
    pub fn writes_accepted(&self) -> u64 {
        self.writes_accepted.load(Ordering::Relaxed)
    }

    /// Gets the number of rejected write calls.
    pub fn writes_rejected(&self) -> u64 {
        self.writes_rejected.load(Ordering::Relaxed)
    }

    /// Gets the number of admitted samples.
    pub fn points_written(&self) -> u64 {
        self.points_written.load(Ordering::Relaxed)
    }

    /// Gets the number of snapshots taken.
    pub fn snapshots_taken(&self) -> u64 {
        self.snapshots_taken.load(Ordering::Relaxed)
    }

    /// Gets the number of snapshots released.
    pub fn snapshots_released(&self) -> u64 {
        self.snapshots_released.load(Ordering::Relaxed)
    }

    pub(crate) fn record_accepted(&self, points: u64) {
        self.writes_accepted.fetch_add(1, Ordering::Relaxed);
        self.points_written.fetch_add(points, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.writes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot(&self) {
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self) {
        self.snapshots_released.fetch_add(1, Ordering::Relaxed);
    }
}
