//! Error and Result types for the Skulk write cache.

use thiserror::Error;

/// A convenience `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// The error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Admitting the write would push live plus snapshotted bytes over the
    /// configured maximum. Nothing from the rejected call was applied.
    #[error("cache maximum memory size exceeded: requested {requested} bytes, holding {size} of {max_size}")]
    MemoryExceeded {
        /// Bytes the rejected write would have added.
        requested: u64,
        /// Bytes held (live + snapshots) when the write was rejected.
        size: u64,
        /// Configured capacity in bytes.
        max_size: u64,
    },

    /// The snapshot is not retained by this cache (never taken here, or
    /// already released).
    #[error("invalid checkpoint: snapshot {id} is not retained by this cache")]
    InvalidCheckpoint {
        /// Identifier of the offending snapshot.
        id: u64,
    },

    /// A snapshot writer failed to persist a snapshot. The snapshot stays
    /// retained and keeps counting against capacity.
    #[error("failed to write snapshot {id}: {source}")]
    SnapshotWrite {
        /// Identifier of the snapshot that failed to persist.
        id: u64,
        /// Underlying writer error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CacheError {
    /// Returns true if this is a capacity rejection.
    ///
    /// Callers use this to decide between backpressure and surfacing the
    /// failure upward.
    pub fn is_memory_exceeded(&self) -> bool {
        matches!(self, CacheError::MemoryExceeded { .. })
    }
}
