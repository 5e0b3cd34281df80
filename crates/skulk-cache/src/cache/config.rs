//! Cache configuration.

use std::time::Duration;

/// Default maximum cache size: 1 GB.
pub const DEFAULT_MAX_SIZE: u64 = 1024 * 1024 * 1024;

/// Default live size at which a snapshot is due: 25 MB.
pub const DEFAULT_SNAPSHOT_SIZE_THRESHOLD: u64 = 25 * 1024 * 1024;

/// Default time since the last snapshot after which one is due: 10 minutes.
pub const DEFAULT_SNAPSHOT_AGE_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Configuration for a [`Cache`](crate::Cache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum bytes held by the cache, live data and retained snapshots
    /// together. Writes that would exceed it are rejected. Default: 1 GB.
    pub max_size: u64,

    /// Live size at which [`Cache::should_snapshot`](crate::Cache::should_snapshot)
    /// reports true. Default: 25 MB.
    pub snapshot_size_threshold: u64,

    /// Time since the last snapshot after which a non-empty cache should be
    /// snapshotted regardless of size. Default: 10 minutes.
    pub snapshot_age_threshold: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            snapshot_size_threshold: DEFAULT_SNAPSHOT_SIZE_THRESHOLD,
            snapshot_age_threshold: DEFAULT_SNAPSHOT_AGE_THRESHOLD,
        }
    }
}

impl CacheConfig {
    /// Sets the maximum cache size in bytes.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the live size threshold for snapshotting.
    pub fn with_snapshot_size_threshold(mut self, threshold: u64) -> Self {
        self.snapshot_size_threshold = threshold;
        self
    }

    /// Sets the age threshold for snapshotting.
    pub fn with_snapshot_age_threshold(mut self, threshold: Duration) -> Self {
        self.snapshot_age_threshold = threshold;
        self
    }
}
