//! Cache - the in-memory write buffer in front of the segment store.
//!
//! The cache absorbs writes, keeps them queryable immediately, and hands its
//! contents to the flush path through snapshots.
//!
//! # Flush Lifecycle
//!
//! ```text
//! write ──► live store ──snapshot()──► retained snapshot ──persist──► release()
//! ```
//!
//! A snapshot swaps the live store for an empty one. Until it is released the
//! snapshot keeps counting against `max_size`, so memory stays bounded while a
//! slow flush is in progress.
//!
//! # Locking
//!
//! A single `RwLock` guards the key map, the live size and the retained
//! snapshot list together, which is what lets [`Cache::snapshot`] observe and
//! replace all three atomically. Writes, snapshots and releases take it
//! exclusively. [`Cache::values`] reads under the shared lock and upgrades to
//! the exclusive lock only when the entry has to be resorted.

pub mod config;
pub mod entry;
pub mod stats;

pub use config::CacheConfig;
pub use entry::Entry;
pub use stats::CacheStats;

use crate::error::{CacheError, Result};
use crate::sample::{samples_size, Sample};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct RetainedSnapshot {
    cache: Arc<Cache>,
    /// Size recorded when the snapshot was taken; this is what release subtracts.
    size: u64,
}

#[derive(Debug)]
struct CacheState {
    store: HashMap<String, Entry>,
    /// Bytes held by the live store.
    size: u64,
    /// Snapshots handed to the flush path and not yet released, oldest first.
    snapshots: Vec<RetainedSnapshot>,
    /// Sum of the recorded sizes in `snapshots`.
    snapshot_size: u64,
    next_snapshot_id: u64,
    last_snapshot_at: Instant,
}

impl CacheState {
    fn new(store: HashMap<String, Entry>, size: u64) -> Self {
        Self {
            store,
            size,
            snapshots: Vec::new(),
            snapshot_size: 0,
            next_snapshot_id: 1,
            last_snapshot_at: Instant::now(),
        }
    }

    fn total_size(&self) -> u64 {
        self.size + self.snapshot_size
    }

    fn append(&mut self, key: &str, samples: &[Sample]) {
        if samples.is_empty() {
            return;
        }
        match self.store.get_mut(key) {
            Some(entry) => entry.add(samples),
            None => {
                let mut entry = Entry::new();
                entry.add(samples);
                self.store.insert(key.to_string(), entry);
            }
        }
    }
}

/// In-memory store of samples for a set of keys, bounded by `max_size`.
///
/// A snapshot returned by [`Cache::snapshot`] is itself a `Cache` holding the
/// former live store. It is read-only by contract: the flush path reads it
/// with [`Cache::keys`] and [`Cache::values`] but must not write to it.
///
/// # Examples
/// ```rust
/// use skulk_cache::{Cache, Sample};
///
/// let cache = Cache::new(1024);
/// cache.write("cpu", &[Sample::new(1, 0.5), Sample::new(2, 0.7)]).unwrap();
/// assert_eq!(cache.size(), 32);
///
/// let snapshot = cache.snapshot();
/// assert_eq!(cache.live_size(), 0);
/// assert_eq!(snapshot.keys(), vec!["cpu".to_string()]);
///
/// cache.release(&snapshot);
/// assert_eq!(cache.size(), 0);
/// ```
#[derive(Debug)]
pub struct Cache {
    /// 0 for a live cache; snapshots get ids from their parent, starting at 1.
    id: u64,
    config: CacheConfig,
    inner: RwLock<CacheState>,
    stats: CacheStats,
}

impl Cache {
    /// Creates a cache that holds at most `max_size` bytes, with default
    /// snapshot thresholds.
    pub fn new(max_size: u64) -> Self {
        Self::with_config(CacheConfig::default().with_max_size(max_size))
    }

    /// Creates a cache from a full configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self::from_store(0, config, HashMap::new(), 0)
    }

    fn from_store(id: u64, config: CacheConfig, store: HashMap<String, Entry>, size: u64) -> Self {
        Self {
            id,
            config,
            inner: RwLock::new(CacheState::new(store, size)),
            stats: CacheStats::new(),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.inner.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.inner.write().unwrap_or_else(|err| err.into_inner())
    }

    /// Rejects the write if `incoming` more bytes would not fit.
    fn check_capacity(&self, state: &CacheState, incoming: u64) -> Result<()> {
        let held = state.total_size();
        if held.saturating_add(incoming) > self.config.max_size {
            self.stats.record_rejected();
            debug!(
                "Rejected cache write of {} bytes: holding {} of {} ({} in snapshots)",
                incoming, held, self.config.max_size, state.snapshot_size
            );
            return Err(CacheError::MemoryExceeded {
                requested: incoming,
                size: held,
                max_size: self.config.max_size,
            });
        }
        Ok(())
    }

    /// Returns the snapshot id of this cache, or 0 for a live cache.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the activity counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Writes samples for `key`.
    ///
    /// Returns the total size held (live + snapshots) after the write.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::MemoryExceeded` if the samples would push the
    /// total over `max_size`. The cache is left unchanged.
    pub fn write(&self, key: &str, samples: &[Sample]) -> Result<u64> {
        let incoming = samples_size(samples);

        let mut state = self.write_state();
        self.check_capacity(&state, incoming)?;

        state.append(key, samples);
        state.size += incoming;
        let total = state.total_size();
        drop(state);

        self.stats.record_accepted(samples.len() as u64);
        Ok(total)
    }

    /// Writes samples for several keys as one unit.
    ///
    /// The capacity check covers the whole batch: either every key is
    /// admitted or none is. Returns the total size held after the write.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::MemoryExceeded` if the batch does not fit.
    pub fn write_multi(&self, batch: &HashMap<String, Vec<Sample>>) -> Result<u64> {
        let incoming: u64 = batch.values().map(|samples| samples_size(samples)).sum();
        let points: usize = batch.values().map(Vec::len).sum();

        let mut state = self.write_state();
        self.check_capacity(&state, incoming)?;

        for (key, samples) in batch {
            state.append(key, samples);
        }
        state.size += incoming;
        let total = state.total_size();
        drop(state);

        self.stats.record_accepted(points as u64);
        Ok(total)
    }

    /// Moves the live store into a new snapshot and starts an empty one.
    ///
    /// The snapshot is retained, and keeps counting against `max_size`,
    /// until it is passed to [`Cache::release`].
    pub fn snapshot(&self) -> Arc<Cache> {
        let mut state = self.write_state();

        let id = state.next_snapshot_id;
        state.next_snapshot_id += 1;

        let store = std::mem::take(&mut state.store);
        let size = std::mem::replace(&mut state.size, 0);
        let key_count = store.len();

        let snapshot = Arc::new(Cache::from_store(id, self.config.clone(), store, size));
        state.snapshots.push(RetainedSnapshot {
            cache: Arc::clone(&snapshot),
            size,
        });
        state.snapshot_size += size;
        state.last_snapshot_at = Instant::now();
        let retained = state.snapshots.len();
        drop(state);

        self.stats.record_snapshot();
        debug!(
            "Took cache snapshot {} with {} keys ({} bytes), {} snapshots retained",
            id, key_count, size, retained
        );

        snapshot
    }

    /// Drops a retained snapshot once its contents are durably persisted.
    ///
    /// Returns true if the snapshot was retained by this cache. Releasing an
    /// unknown or already released snapshot is a no-op and returns false.
    pub fn release(&self, snapshot: &Arc<Cache>) -> bool {
        let mut state = self.write_state();

        let pos = state
            .snapshots
            .iter()
            .position(|retained| Arc::ptr_eq(&retained.cache, snapshot));
        let Some(pos) = pos else {
            drop(state);
            debug!("Ignoring release of unretained snapshot {}", snapshot.id());
            return false;
        };

        let retained = state.snapshots.remove(pos);
        state.snapshot_size = state
            .snapshot_size
            .checked_sub(retained.size)
            .unwrap_or_else(|| unreachable!("snapshot accounting underflow"));
        let remaining = state.snapshots.len();
        drop(state);

        self.stats.record_release();
        debug!(
            "Released cache snapshot {} ({} bytes), {} snapshots retained",
            snapshot.id(),
            retained.size,
            remaining
        );
        true
    }

    /// Like [`Cache::release`], but reports an unknown snapshot as an error.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidCheckpoint` if the snapshot is not retained.
    pub fn try_release(&self, snapshot: &Arc<Cache>) -> Result<()> {
        if self.release(snapshot) {
            Ok(())
        } else {
            Err(CacheError::InvalidCheckpoint { id: snapshot.id() })
        }
    }

    /// Returns the retained snapshots, oldest first.
    ///
    /// The query layer reads these alongside the live cache; newer snapshots
    /// hold newer writes.
    pub fn retained_snapshots(&self) -> Vec<Arc<Cache>> {
        self.read_state()
            .snapshots
            .iter()
            .map(|retained| Arc::clone(&retained.cache))
            .collect()
    }

    /// Returns the number of retained snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.read_state().snapshots.len()
    }

    /// Returns the bytes held by live data and retained snapshots.
    ///
    /// A point-in-time figure; concurrent writers may change it right away.
    pub fn size(&self) -> u64 {
        self.read_state().total_size()
    }

    /// Returns the bytes held by the live store only.
    pub fn live_size(&self) -> u64 {
        self.read_state().size
    }

    /// Returns the bytes held by retained snapshots.
    pub fn snapshot_size(&self) -> u64 {
        self.read_state().snapshot_size
    }

    /// Returns the configured capacity in bytes.
    pub fn max_size(&self) -> u64 {
        self.config.max_size
    }

    /// Returns the live keys in lexicographic order.
    ///
    /// Keys that only exist in retained snapshots are not included.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read_state().store.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Returns the number of live keys.
    pub fn key_count(&self) -> usize {
        self.read_state().store.len()
    }

    /// Returns true if the live store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.read_state().store.is_empty()
    }

    /// Returns the live samples for `key`, sorted by timestamp and deduplicated.
    ///
    /// Returns an empty vector if the key is not in the live store. Samples
    /// held only by retained snapshots are not consulted.
    pub fn values(&self, key: &str) -> Vec<Sample> {
        {
            let state = self.read_state();
            match state.store.get(key) {
                None => return Vec::new(),
                Some(entry) => {
                    if let Some(values) = entry.sorted_values() {
                        return values.to_vec();
                    }
                }
            }
        }

        // The entry needs a resort. Another thread may have resorted it, or a
        // snapshot may have moved it out, before the write lock was acquired.
        let mut state = self.write_state();
        match state.store.get_mut(key) {
            None => Vec::new(),
            Some(entry) => entry.read().to_vec(),
        }
    }

    /// Returns true if the live store should be snapshotted.
    ///
    /// A snapshot is due when the live size reaches
    /// `snapshot_size_threshold`, or when the store is non-empty and
    /// `snapshot_age_threshold` has passed since the last snapshot.
    pub fn should_snapshot(&self) -> bool {
        let state = self.read_state();
        if state.size >= self.config.snapshot_size_threshold {
            return true;
        }
        state.size > 0 && state.last_snapshot_at.elapsed() >= self.config.snapshot_age_threshold
    }

    /// Returns the time since the last snapshot, or since creation if none
    /// was taken.
    pub fn since_last_snapshot(&self) -> Duration {
        self.read_state().last_snapshot_at.elapsed()
    }

    #[cfg(test)]
    pub(crate) fn set_last_snapshot_at(&self, at: Instant) {
        self.write_state().last_snapshot_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::FieldValue;

    /// A string sample accounting exactly `bytes` bytes (minimum 8).
    fn sized_sample(ts: i64, bytes: u64) -> Sample {
        Sample::new(ts, "x".repeat((bytes - 8) as usize))
    }

    fn floats(timestamps: &[i64]) -> Vec<Sample> {
        timestamps.iter().map(|&ts| Sample::new(ts, ts as f64)).collect()
    }

    #[test]
    fn test_write_and_read_back() {
        let cache = Cache::new(1024);
        let size = cache.write("cpu", &floats(&[1, 2, 3])).unwrap();

        assert_eq!(size, 48);
        assert_eq!(cache.size(), 48);
        assert_eq!(cache.live_size(), 48);
        assert_eq!(cache.values("cpu"), floats(&[1, 2, 3]));
        assert_eq!(cache.stats().writes_accepted(), 1);
        assert_eq!(cache.stats().points_written(), 3);
    }

    #[test]
    fn test_values_missing_key_is_empty() {
        let cache = Cache::new(1024);
        assert!(cache.values("nope").is_empty());
    }

    #[test]
    fn test_values_resorts_out_of_order_writes() {
        let cache = Cache::new(1024);
        cache.write("cpu", &floats(&[5, 3, 8])).unwrap();
        cache.write("cpu", &floats(&[1])).unwrap();

        let ts: Vec<i64> = cache.values("cpu").iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![1, 3, 5, 8]);

        // A second read takes the shared-lock path.
        let ts: Vec<i64> = cache.values("cpu").iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![1, 3, 5, 8]);
    }

    #[test]
    fn test_values_last_write_wins() {
        let cache = Cache::new(1024);
        cache.write("cpu", &[Sample::new(1, 1.0)]).unwrap();
        cache.write("cpu", &[Sample::new(1, 2.0)]).unwrap();

        let values = cache.values("cpu");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, FieldValue::Float(2.0));
    }

    #[test]
    fn test_write_rejected_when_full() {
        let cache = Cache::new(100);
        cache.write("cpu", &[sized_sample(1, 60)]).unwrap();

        let result = cache.write("mem", &[sized_sample(1, 50)]);
        assert!(matches!(
            result,
            Err(CacheError::MemoryExceeded {
                requested: 50,
                size: 60,
                max_size: 100
            })
        ));
        assert_eq!(cache.size(), 60);
        assert_eq!(cache.keys(), vec!["cpu".to_string()]);
        assert_eq!(cache.stats().writes_rejected(), 1);
    }

    #[test]
    fn test_write_exactly_at_capacity() {
        let cache = Cache::new(100);
        cache.write("cpu", &[sized_sample(1, 100)]).unwrap();
        assert_eq!(cache.size(), 100);
        assert!(cache.write("cpu", &[sized_sample(2, 8)]).is_err());
    }

    #[test]
    fn test_write_multi_all_or_nothing() {
        let cache = Cache::new(100);
        cache.write("cpu", &[sized_sample(1, 40)]).unwrap();

        let mut batch = HashMap::new();
        batch.insert("mem".to_string(), vec![sized_sample(1, 30)]);
        batch.insert("disk".to_string(), vec![sized_sample(1, 40)]);

        let err = cache.write_multi(&batch).unwrap_err();
        assert!(err.is_memory_exceeded());
        assert_eq!(cache.keys(), vec!["cpu".to_string()]);
        assert_eq!(cache.size(), 40);

        batch.remove("disk");
        assert_eq!(cache.write_multi(&batch).unwrap(), 70);
        assert_eq!(cache.keys(), vec!["cpu".to_string(), "mem".to_string()]);
    }

    #[test]
    fn test_empty_write_creates_no_key() {
        let cache = Cache::new(100);
        assert_eq!(cache.write("cpu", &[]).unwrap(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_sorted() {
        let cache = Cache::new(1024);
        for key in ["mem", "cpu", "disk"] {
            cache.write(key, &floats(&[1])).unwrap();
        }
        assert_eq!(cache.keys(), vec!["cpu", "disk", "mem"]);
        assert_eq!(cache.key_count(), 3);
    }

    #[test]
    fn test_snapshot_moves_live_store() {
        let cache = Cache::new(1024);
        cache.write("cpu", &floats(&[1, 2])).unwrap();
        cache.write("mem", &floats(&[1])).unwrap();

        let snapshot = cache.snapshot();

        assert_eq!(snapshot.id(), 1);
        assert_eq!(snapshot.size(), 48);
        assert_eq!(snapshot.keys(), vec!["cpu", "mem"]);
        assert_eq!(snapshot.values("cpu"), floats(&[1, 2]));

        assert_eq!(cache.live_size(), 0);
        assert!(cache.keys().is_empty());
        assert!(cache.values("cpu").is_empty());
        assert_eq!(cache.snapshot_size(), 48);
        assert_eq!(cache.size(), 48);
        assert_eq!(cache.snapshot_count(), 1);
    }

    #[test]
    fn test_snapshot_ids_increase() {
        let cache = Cache::new(1024);
        let first = cache.snapshot();
        let second = cache.snapshot();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);

        let retained: Vec<u64> = cache.retained_snapshots().iter().map(|s| s.id()).collect();
        assert_eq!(retained, vec![1, 2]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let cache = Cache::new(1024);
        cache.write("cpu", &floats(&[1])).unwrap();
        let first = cache.snapshot();
        cache.write("cpu", &floats(&[2, 3])).unwrap();
        let second = cache.snapshot();
        assert_eq!(cache.snapshot_size(), 48);

        assert!(cache.release(&first));
        assert_eq!(cache.snapshot_size(), 32);
        assert!(!cache.release(&first));
        assert_eq!(cache.snapshot_size(), 32);

        assert!(cache.release(&second));
        assert_eq!(cache.snapshot_size(), 0);
        assert_eq!(cache.stats().snapshots_released(), 2);
    }

    #[test]
    fn test_release_unknown_snapshot() {
        let cache = Cache::new(1024);
        let other = Cache::new(1024);
        other.write("cpu", &floats(&[1])).unwrap();
        let foreign = other.snapshot();

        cache.write("cpu", &floats(&[1])).unwrap();
        let _own = cache.snapshot();

        assert!(!cache.release(&foreign));
        assert_eq!(cache.snapshot_size(), 16);
        assert!(matches!(
            cache.try_release(&foreign),
            Err(CacheError::InvalidCheckpoint { id: 1 })
        ));
    }

    #[test]
    fn test_should_snapshot_size_threshold() {
        let cache = Cache::with_config(
            CacheConfig::default()
                .with_max_size(1024)
                .with_snapshot_size_threshold(32),
        );
        cache.write("cpu", &floats(&[1])).unwrap();
        assert!(!cache.should_snapshot());
        cache.write("cpu", &floats(&[2])).unwrap();
        assert!(cache.should_snapshot());

        let _snapshot = cache.snapshot();
        assert!(!cache.should_snapshot());
    }

    #[test]
    fn test_should_snapshot_age_threshold() {
        let cache = Cache::with_config(
            CacheConfig::default().with_snapshot_age_threshold(Duration::from_secs(60)),
        );
        let Some(past) = Instant::now().checked_sub(Duration::from_secs(120)) else {
            return;
        };

        // An empty cache is never due.
        cache.set_last_snapshot_at(past);
        assert!(!cache.should_snapshot());

        cache.write("cpu", &floats(&[1])).unwrap();
        cache.set_last_snapshot_at(Instant::now());
        assert!(!cache.should_snapshot());

        cache.set_last_snapshot_at(past);
        assert!(cache.since_last_snapshot() >= Duration::from_secs(60));
        assert!(cache.should_snapshot());
    }
}
