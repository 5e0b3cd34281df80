//! Skulk Cache - in-memory write buffer for the Alopex Skulk time series engine.
//!
//! The cache absorbs incoming writes, serves them to readers immediately, and
//! hands its contents to the flush path as snapshots that are drained into
//! immutable on-disk segments.
//!
//! # Components
//!
//! - [`Entry`]: Per-key append-only buffer with lazy sort and dedup
//! - [`Cache`]: Keyed entries, memory accounting, and the snapshot lifecycle
//! - [`flush()`]: Driver for the snapshot → persist → release cycle
//!
//! # Example
//!
//! ```rust,ignore
//! use skulk_cache::{Cache, Sample};
//!
//! let cache = Cache::new(64 * 1024 * 1024);
//! cache.write("cpu,host=server1#usage", &[Sample::new(now_ns, 0.75)])?;
//!
//! // Background flush
//! if cache.should_snapshot() {
//!     let snapshot = cache.snapshot();
//!     segment_writer.write(&snapshot)?;
//!     cache.release(&snapshot);
//! }
//! ```

#![deny(missing_docs)]

pub mod cache;
pub mod error;
pub mod flush;
pub mod sample;

pub use cache::{Cache, CacheConfig, CacheStats, Entry};
pub use error::{CacheError, Result};
pub use flush::{flush, FlushReport, SnapshotWriter};
pub use sample::{FieldValue, Sample, Timestamp};
