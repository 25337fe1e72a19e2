use std::cmp;
use std::collections::BinaryHeap;

use super::cluster::ClusterKey;

/// A heap entry pointing at a cluster as it looked when the entry was pushed.
/// Orders by quality, breaking exact ties in favor of the lower cluster key
/// so extraction order is deterministic.
#[derive(Debug, Clone, Copy)]
pub struct ClusterRef {
    pub key: ClusterKey,
    pub version: u32,
    pub quality: f64,
}

impl PartialEq for ClusterRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.version == other.version
    }
}

impl Eq for ClusterRef {}

impl PartialOrd for ClusterRef {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClusterRef {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match self.quality.total_cmp(&other.quality) {
            cmp::Ordering::Equal => other.key.cmp(&self.key),
            ord => ord,
        }
    }
}

/// Keeps pending clusters ordered by quality. Repositioning is done by
/// pushing a fresh entry under a bumped version; superseded entries stay in
/// the heap and are discarded when popped (lazy deletion), which keeps the
/// heap itself ordinary.
#[derive(Debug, Default)]
pub struct ClusterPriorityIndex {
    heap: BinaryHeap<ClusterRef>,
}

impl ClusterPriorityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, key: ClusterKey, version: u32, quality: f64) {
        self.heap.push(ClusterRef {
            key,
            version,
            quality,
        });
    }

    /// Pop the best entry that `is_current` confirms still reflects a pending
    /// cluster; anything stale is dropped on the way.
    pub fn pop_valid<F: FnMut(&ClusterRef) -> bool>(
        &mut self,
        mut is_current: F,
    ) -> Option<ClusterRef> {
        while let Some(entry) = self.heap.pop() {
            if is_current(&entry) {
                return Some(entry);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
