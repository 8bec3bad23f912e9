use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Bounded concurrent table pairing a start event with its completion.
///
/// Keys are kernel-object identities (request pointer, socket identity,
/// tid, cgroup id); values are open-event records carrying at least the
/// start timestamp. Capacity is fixed at creation: a start event for a key
/// already present overwrites the stale record unconditionally, while a
/// start event for a fresh key is dropped when the table is full. Nothing
/// is ever evicted and no operation blocks beyond the shard it touches.
///
/// All three protocol failure modes are absorbed here without error:
/// missed starts surface as `take` returning `None`, capacity exhaustion
/// as `insert` returning `false`, and key reuse as a silent overwrite.
pub struct OpenTable<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
    occupied: AtomicUsize,
    capacity: usize,
}

impl<K, V> OpenTable<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty table that will hold at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity(capacity),
            occupied: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Records a start event.
    ///
    /// Overwrites any existing record under `key`. Returns false (and drops
    /// the record) if `key` is new and the table is at capacity.
    pub fn insert(&self, key: K, value: V) -> bool {
        match self.map.entry(key) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() = value;
                true
            }
            Entry::Vacant(entry) => {
                // Reserve a slot before inserting so concurrent inserts
                // cannot overshoot the capacity.
                let reserved = self
                    .occupied
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                        (n < self.capacity).then_some(n + 1)
                    });
                if reserved.is_err() {
                    return false;
                }
                entry.insert(value);
                true
            }
        }
    }

    /// Consumes the record for `key`, if present (completion path).
    pub fn take(&self, key: &K) -> Option<V> {
        let removed = self.map.remove(key);
        if removed.is_some() {
            self.occupied.fetch_sub(1, Ordering::Relaxed);
        }
        removed.map(|(_, v)| v)
    }

    /// Deletes the record for `key` without reading it (abort path).
    pub fn remove(&self, key: &K) {
        let _ = self.take(key);
    }

    /// Reads the record for `key` without consuming it.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Copy,
    {
        self.map.get(key).map(|r| *r)
    }

    /// Number of open records.
    pub fn len(&self) -> usize {
        self.occupied.load(Ordering::Relaxed)
    }

    /// True if no records are open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of records the table will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> std::fmt::Debug for OpenTable<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
