use std::sync::atomic::{AtomicU64, Ordering};

/// Number of histogram buckets.
pub const NUM_BUCKETS: usize = 461;

/// Catch-all bucket for values >= 1,000,000 of the input unit.
pub const OVERFLOW_BUCKET: u32 = 460;

/// Maps a raw measurement (microseconds, kibibytes, bytes - the unit is
/// the caller's concern) to a bucket index in [0, 460].
///
/// Five decades of piecewise-linear compression: exact below 100, then one
/// bucket per 10/100/1,000/10,000 units, with 460 as the overflow bucket.
/// Integer floor division throughout; the encoding is wire-compatible with
/// collectors that already decode it, so it must not change.
pub fn bucket_index(value: u64) -> u32 {
    if value < 100 {
        value as u32
    } else if value < 1_000 {
        (90 + value / 10) as u32
    } else if value < 10_000 {
        (180 + value / 100) as u32
    } else if value < 100_000 {
        (270 + value / 1_000) as u32
    } else if value < 1_000_000 {
        (360 + value / 10_000) as u32
    } else {
        OVERFLOW_BUCKET
    }
}

/// Inclusive value range covered by a bucket.
///
/// `high` is `None` for the open-ended overflow bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRange {
    pub low: u64,
    pub high: Option<u64>,
}

/// Returns the value range a bucket index covers, for collectors that
/// convert indices back to approximate measurements.
///
/// Returns `None` for indices outside [0, 460].
pub fn bucket_range(index: u32) -> Option<BucketRange> {
    let index = u64::from(index);
    let (low, high) = if index < 100 {
        (index, index)
    } else if index < 190 {
        let low = (index - 90) * 10;
        (low, low + 9)
    } else if index < 280 {
        let low = (index - 180) * 100;
        (low, low + 99)
    } else if index < 370 {
        let low = (index - 270) * 1_000;
        (low, low + 999)
    } else if index < 460 {
        let low = (index - 360) * 10_000;
        (low, low + 9_999)
    } else if index == 460 {
        return Some(BucketRange {
            low: 1_000_000,
            high: None,
        });
    } else {
        return None;
    };

    Some(BucketRange {
        low,
        high: Some(high),
    })
}

/// Fixed 461-slot histogram of cumulative counts.
///
/// Created zeroed at session start, mutated only by atomic increment, never
/// reset while the session lives. Safe for concurrent recording from any
/// number of callers; increments are never lost.
pub struct Histogram {
    buckets: [AtomicU64; NUM_BUCKETS],
}

impl Histogram {
    /// Creates a new histogram with all buckets at zero.
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Records a raw measurement into its bucket.
    pub fn record(&self, value: u64) {
        self.record_index(bucket_index(value));
    }

    /// Increments a bucket by index. Out-of-range indices are ignored.
    pub fn record_index(&self, index: u32) {
        if let Some(bucket) = self.buckets.get(index as usize) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the current bucket counts as a snapshot.
    pub fn snapshot(&self) -> [u64; NUM_BUCKETS] {
        let mut result = [0u64; NUM_BUCKETS];
        for (slot, bucket) in result.iter_mut().zip(self.buckets.iter()) {
            *slot = bucket.load(Ordering::Relaxed);
        }
        result
    }

    /// Total number of recorded samples.
    pub fn total(&self) -> u64 {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("total", &self.total())
            .finish()
    }
}
