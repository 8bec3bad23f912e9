use std::sync::atomic::{AtomicU64, Ordering};

/// Single-slot occurrence counter for events with no latency or size
/// dimension (drops, retransmits, accepts).
///
/// Cumulative since session start, monotonically non-decreasing until the
/// session ends; wraps per u64 semantics rather than saturating.
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Creates a new zeroed counter.
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increments the counter by one.
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the counter by n.
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current cumulative count.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Counter").field(&self.value()).finish()
    }
}
