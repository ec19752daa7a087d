//! Eviction Index
//!
//! Min-heap over the memory-resident records, keyed by view count.
//!
//! View counts change on every request, outside the heap. Rather than
//! sifting on each increment, the index is marked stale and re-heapified with
//! fresh counts right before an eviction decision. Between decisions the heap
//! order may not reflect the true minimum.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::record::RecordId;

/// Lazily re-heapified popularity index
#[derive(Debug, Default)]
pub struct EvictionIndex {
    heap: BinaryHeap<Reverse<(u64, RecordId)>>,
    stale: bool,
}

impl EvictionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record with its current view count.
    pub fn push(&mut self, id: RecordId, views: u64) {
        self.heap.push(Reverse((views, id)));
    }

    /// Note that some member's view count changed.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Restore heap order using current view counts.
    ///
    /// No-op when nothing changed since the last refresh.
    pub fn refresh<F>(&mut self, views_of: F)
    where
        F: Fn(RecordId) -> u64,
    {
        if !self.stale {
            return;
        }
        let entries: Vec<_> = self
            .heap
            .drain()
            .map(|Reverse((_, id))| Reverse((views_of(id), id)))
            .collect();
        self.heap = BinaryHeap::from(entries);
        self.stale = false;
    }

    /// Rebuild unconditionally (used after the startup pass).
    pub fn rebuild<F>(&mut self, views_of: F)
    where
        F: Fn(RecordId) -> u64,
    {
        self.stale = true;
        self.refresh(views_of);
    }

    /// Remove and return the least viewed record. Ties go to the lower id.
    ///
    /// Only meaningful right after [`refresh`](Self::refresh).
    pub fn pop_min(&mut self) -> Option<(RecordId, u64)> {
        self.heap.pop().map(|Reverse((views, id))| (id, views))
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.heap.iter().any(|Reverse((_, member))| *member == id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
