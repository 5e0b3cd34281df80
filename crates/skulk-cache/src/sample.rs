//! Timestamped samples and the sequence helpers the cache relies on.
//!
//! A [`Sample`] is one value for a key at a nanosecond timestamp. The cache
//! only needs two things from a sample sequence: a byte-size estimate for
//! memory accounting, and a deduplicate-and-sort pass keyed on timestamp.

/// Timestamp in nanoseconds since the Unix epoch.
pub type Timestamp = i64;

/// Bytes accounted for the timestamp of every sample.
const TIMESTAMP_SIZE: u64 = 8;

/// The value carried by a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit float.
    Float(f64),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Unsigned 64-bit integer.
    Unsigned(u64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
}

impl FieldValue {
    /// Estimated in-memory size of the value payload in bytes.
    pub fn size(&self) -> u64 {
        match self {
            FieldValue::Float(_) | FieldValue::Integer(_) | FieldValue::Unsigned(_) => 8,
            FieldValue::Boolean(_) => 1,
            FieldValue::String(s) => s.len() as u64,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Unsigned(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// A single timestamped value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Timestamp in nanoseconds.
    pub timestamp: Timestamp,
    /// The sampled value.
    pub value: FieldValue,
}

impl Sample {
    /// Creates a new sample.
    ///
    /// # Examples
    /// ```rust
    /// use skulk_cache::Sample;
    ///
    /// let sample = Sample::new(1_000, 0.75);
    /// assert_eq!(sample.size(), 16);
    /// ```
    pub fn new(timestamp: Timestamp, value: impl Into<FieldValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Estimated in-memory size of this sample in bytes.
    pub fn size(&self) -> u64 {
        TIMESTAMP_SIZE + self.value.size()
    }
}

/// Returns the accounted byte size of a batch of samples.
pub fn samples_size(samples: &[Sample]) -> u64 {
    samples.iter().map(Sample::size).sum()
}

/// Returns true if timestamps in `samples` are strictly increasing.
///
/// The scan compares each sample with its immediate predecessor, so any
/// descent or repeat anywhere in the batch is caught.
pub fn is_strictly_increasing(samples: &[Sample]) -> bool {
    samples
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp)
}

/// Sorts `samples` by timestamp and removes duplicate timestamps in place.
///
/// When several samples share a timestamp the one written last survives.
pub fn deduplicate(samples: &mut Vec<Sample>) {
    // Stable sort keeps write order among equal timestamps.
    samples.sort_by_key(|s| s.timestamp);
    samples.dedup_by(|later, kept| {
        if later.timestamp == kept.timestamp {
            std::mem::swap(later, kept);
            true
        } else {
            false
        }
    });
}
