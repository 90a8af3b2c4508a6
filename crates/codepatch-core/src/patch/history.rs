//! Bounded in-memory audit trail of apply attempts.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::PatchHistoryEntry;

pub struct PatchHistory {
    capacity: usize,
    entries: Mutex<VecDeque<PatchHistoryEntry>>,
}

impl Default for PatchHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PatchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append, evicting the oldest entry past capacity.
    pub fn record(&self, entry: PatchHistoryEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<PatchHistoryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn last(&self) -> Option<PatchHistoryEntry> {
        self.entries.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
