//! Flush driver for draining cache snapshots into the segment store.
//!
//! The segment format lives outside this crate; it plugs in through
//! [`SnapshotWriter`]. The driver follows the flush durability contract:
//!
//! ```text
//! snapshot() → write_snapshot() → release()
//! ```
//!
//! A snapshot is released only after its writer call returns `Ok`. If a write
//! fails the snapshot stays retained, still counted against the cache's
//! capacity, and the next [`flush`] call retries it before newer snapshots.

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use std::sync::Arc;
use tracing::{debug, error};

/// Persists the contents of a cache snapshot.
///
/// Implementations must return only once the snapshot is durable; the
/// driver releases the snapshot as soon as this returns `Ok`.
pub trait SnapshotWriter {
    /// Error produced by the writer.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes every key of `snapshot` to durable storage.
    fn write_snapshot(&mut self, snapshot: &Cache) -> std::result::Result<(), Self::Error>;
}

/// Summary of a successful [`flush`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of snapshots written and released.
    pub snapshots_written: usize,
    /// Keys across all written snapshots.
    pub keys_written: usize,
    /// Bytes returned to the cache's capacity.
    pub bytes_released: u64,
}

/// Snapshots the live cache and drains every retained snapshot.
///
/// A new snapshot is only taken when the live store holds data. Retained
/// snapshots, including ones left over from earlier failed flushes, are
/// written oldest first.
///
/// # Errors
///
/// Returns `CacheError::SnapshotWrite` on the first writer failure. The
/// failing snapshot and all newer ones remain retained.
pub fn flush<W: SnapshotWriter>(cache: &Cache, writer: &mut W) -> Result<FlushReport> {
    if !cache.is_empty() {
        cache.snapshot();
    }

    let mut report = FlushReport::default();
    for snapshot in cache.retained_snapshots() {
        write_and_release(cache, &snapshot, writer)?;
        report.snapshots_written += 1;
        report.keys_written += snapshot.key_count();
        report.bytes_released += snapshot.size();
    }

    if report.snapshots_written > 0 {
        debug!(
            "Flushed {} cache snapshots ({} keys, {} bytes)",
            report.snapshots_written, report.keys_written, report.bytes_released
        );
    }
    Ok(report)
}

fn write_and_release<W: SnapshotWriter>(
    cache: &Cache,
    snapshot: &Arc<Cache>,
    writer: &mut W,
) -> Result<()> {
    if let Err(e) = writer.write_snapshot(snapshot) {
        error!("Failed to write cache snapshot {}: {}", snapshot.id(), e);
        return Err(CacheError::SnapshotWrite {
            id: snapshot.id(),
            source: Box::new(e),
        });
    }
    cache.release(snapshot);
    Ok(())
}
