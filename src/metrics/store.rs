use std::collections::VecDeque;

use parking_lot::Mutex;

/// Fixed-capacity, thread-safe FIFO of one record type.
///
/// Every append is stamped with a sequence number that keeps growing across
/// evictions, prunes and `clear()`, so readers can ask for "everything since
/// sequence N" without re-reading records they already saw.
pub struct BoundedMetricStore<T> {
    capacity: usize,
    inner: Mutex<Ring<T>>,
}

struct Ring<T> {
    entries: VecDeque<Entry<T>>,
    next_seq: u64,
}

struct Entry<T> {
    seq: u64,
    record: T,
}

impl<T: Clone> BoundedMetricStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Ring {
                // Capped so a huge configured capacity doesn't allocate up front
                entries: VecDeque::with_capacity(capacity.min(1024)),
                next_seq: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// O(1) insert. Evicts the oldest record when full; a no-op when the
    /// capacity is zero.
    pub fn append(&self, record: T) {
        if self.capacity == 0 {
            return;
        }
        let mut ring = self.inner.lock();
        if ring.entries.len() == self.capacity {
            ring.entries.pop_front();
        }
        let seq = ring.next_seq;
        ring.next_seq += 1;
        ring.entries.push_back(Entry { seq, record });
    }

    /// Point-in-time copy in insertion order. The lock is released before
    /// the caller sees the data.
    pub fn snapshot(&self) -> Vec<T> {
        let ring = self.inner.lock();
        ring.entries.iter().map(|e| e.record.clone()).collect()
    }

    /// Records with a sequence `>= since`, plus the cursor to pass next time.
    pub fn snapshot_since(&self, since: u64) -> (Vec<T>, u64) {
        let ring = self.inner.lock();
        let records = ring
            .entries
            .iter()
            .filter(|e| e.seq >= since)
            .map(|e| e.record.clone())
            .collect();
        (records, ring.next_seq)
    }

    /// Keeps only the records matching `keep`; returns how many were dropped.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut ring = self.inner.lock();
        let before = ring.entries.len();
        ring.entries.retain(|e| keep(&e.record));
        before - ring.entries.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
