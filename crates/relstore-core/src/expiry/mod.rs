//! TTL eviction heap.
//!
//! A binary min-heap on expiry time with a side table from record handle to
//! heap slot, so an entry can be found and removed by identity in O(log n).
//! Each record has at most one entry at a time.


use crate::arena::Handle;
use serde::Serialize;
use std::{cmp::Ordering, collections::HashMap};

/// Expiry of an entry that never expires.
pub const NEVER: u64 = u64::MAX;

///
/// HeapEntry
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct HeapEntry {
    pub handle: Handle,
    pub inserted_at: u64,
    pub expires: u64,
}

impl HeapEntry {
    /// Arm an entry `max_age` ms after `now`, or never when unbounded.
    #[must_use]
    pub const fn new(handle: Handle, now: u64, max_age: Option<u64>) -> Self {
        let expires = match max_age {
            Some(age) => now.saturating_add(age),
            None => NEVER,
        };

        Self {
            handle,
            inserted_at: now,
            expires,
        }
    }

    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        self.expires != NEVER && self.expires <= now
    }

    fn heap_cmp(&self, other: &Self) -> Ordering {
        self.expires
            .cmp(&other.expires)
            .then(self.inserted_at.cmp(&other.inserted_at))
            .then(self.handle.cmp(&other.handle))
    }
}

///
/// ExpiryHeap
///

#[derive(Debug, Default)]
pub struct ExpiryHeap {
    entries: Vec<HeapEntry>,
    positions: HashMap<Handle, usize>,
}

impl ExpiryHeap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&HeapEntry> {
        self.positions.get(&handle).map(|&at| &self.entries[at])
    }

    #[must_use]
    pub fn peek(&self) -> Option<&HeapEntry> {
        self.entries.first()
    }

    /// Push an entry, first dropping any entry already held for its handle.
    pub fn push(&mut self, entry: HeapEntry) {
        self.remove(entry.handle);

        let at = self.entries.len();
        self.entries.push(entry);
        self.positions.insert(entry.handle, at);
        self.sift_up(at);
    }

    pub fn pop(&mut self) -> Option<HeapEntry> {
        if self.entries.is_empty() {
            return None;
        }

        Some(self.remove_at(0))
    }

    /// Remove the entry held for `handle`.
    pub fn remove(&mut self, handle: Handle) -> Option<HeapEntry> {
        let at = *self.positions.get(&handle)?;

        Some(self.remove_at(at))
    }

    /// Pop every entry whose expiry is at or before `now`, soonest first.
    pub fn drain_expired(&mut self, now: u64) -> Vec<HeapEntry> {
        let mut out = Vec::new();
        while self.peek().is_some_and(|top| top.is_expired(now)) {
            if let Some(entry) = self.pop() {
                out.push(entry);
            }
        }

        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    fn remove_at(&mut self, at: usize) -> HeapEntry {
        let entry = self.entries.swap_remove(at);
        self.positions.remove(&entry.handle);

        if at < self.entries.len() {
            self.positions.insert(self.entries[at].handle, at);

            // the moved entry may need to go either way
            self.sift_down(at);
            self.sift_up(at);
        }

        entry
    }

    fn sift_up(&mut self, mut at: usize) {
        while at > 0 {
            let parent = (at - 1) / 2;
            if self.entries[at].heap_cmp(&self.entries[parent]) != Ordering::Less {
                break;
            }
            self.swap(at, parent);
            at = parent;
        }
    }

    fn sift_down(&mut self, mut at: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * at + 1;
            let right = left + 1;
            let mut smallest = at;

            if left < len && self.entries[left].heap_cmp(&self.entries[smallest]) == Ordering::Less
            {
                smallest = left;
            }
            if right < len
                && self.entries[right].heap_cmp(&self.entries[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == at {
                break;
            }

            self.swap(at, smallest);
            at = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.entries.swap(a, b);
        self.positions.insert(self.entries[a].handle, a);
        self.positions.insert(self.entries[b].handle, b);
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        assert_eq!(self.entries.len(), self.positions.len());
        for (at, entry) in self.entries.iter().enumerate() {
            assert_eq!(self.positions[&entry.handle], at);
            if at > 0 {
                let parent = (at - 1) / 2;
                assert_ne!(
                    self.entries[parent].heap_cmp(entry),
                    Ordering::Greater,
                    "heap order broken at {at}"
                );
            }
        }
    }
}
