//! Per-key append-only sample buffer with lazy sort and dedup.

use crate::sample::{deduplicate, is_strictly_increasing, samples_size, Sample};

/// Buffered samples for one key.
///
/// Appends go to the tail unconditionally. Sorting and deduplication are
/// deferred to [`Entry::read`] and only happen when `needs_sort` is set.
#[derive(Debug, Default, Clone)]
pub struct Entry {
    values: Vec<Sample>,
    needs_sort: bool,
    size: u64,
}

impl Entry {
    /// Creates an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch of samples.
    ///
    /// Flags the entry for resort when the batch does not start strictly after
    /// the stored tail, or when the batch itself is not strictly increasing.
    /// While the entry is sorted its tail is its maximum, so this never misses
    /// real disorder.
    pub fn add(&mut self, samples: &[Sample]) {
        let Some(first) = samples.first() else {
            return;
        };

        if let Some(last) = self.values.last() {
            if first.timestamp <= last.timestamp {
                self.needs_sort = true;
            }
        }

        if !self.needs_sort && !is_strictly_increasing(samples) {
            self.needs_sort = true;
        }

        self.values.extend_from_slice(samples);
        self.size += samples_size(samples);
    }

    /// Returns the samples sorted by timestamp with one sample per timestamp.
    ///
    /// Resorts in place if needed; the last write for a timestamp wins.
    pub fn read(&mut self) -> &[Sample] {
        if self.needs_sort {
            deduplicate(&mut self.values);
            self.needs_sort = false;
        }
        &self.values
    }

    /// Returns the stored samples only if they are already sorted.
    pub fn sorted_values(&self) -> Option<&[Sample]> {
        if self.needs_sort {
            None
        } else {
            Some(&self.values)
        }
    }

    /// Returns true if the next read has to resort.
    pub fn needs_sort(&self) -> bool {
        self.needs_sort
    }

    /// Bytes appended to this entry so far.
    ///
    /// Dedup does not shrink this figure; it tracks what the cache admitted.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of stored samples, including duplicates not yet collapsed.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no samples are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
