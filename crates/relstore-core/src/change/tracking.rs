use crate::{
    arena::Handle,
    change::{ChangeSet, IgnoreSet, diff},
    record::Record,
    value::Value,
};
use serde::Serialize;

/// Monotonic timestamp bump: never reuse or go below `prev`.
#[must_use]
pub const fn next_timestamp(prev: u64, now: u64) -> u64 {
    if now > prev { now } else { prev.saturating_add(1) }
}

///
/// ChangeRecord
///
/// One entry of per-record or collection-wide change history.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub target: Handle,
    pub key: Value,
    #[serde(flatten)]
    pub changes: ChangeSet,
    pub timestamp: u64,
}

///
/// Tracking
///

#[derive(Clone, Debug)]
pub struct Tracking {
    snapshot: Record,
    observed: Record,
    last_modified: u64,
    last_saved: Option<u64>,
    history: Vec<ChangeRecord>,
}

impl Tracking {
    #[must_use]
    pub fn new(record: &Record, now: u64) -> Self {
        Self {
            snapshot: record.clone(),
            observed: record.clone(),
            last_modified: now,
            last_saved: None,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub const fn snapshot(&self) -> &Record {
        &self.snapshot
    }

    #[must_use]
    pub const fn observed(&self) -> &Record {
        &self.observed
    }

    #[must_use]
    pub const fn last_modified(&self) -> u64 {
        self.last_modified
    }

    #[must_use]
    pub const fn last_saved(&self) -> Option<u64> {
        self.last_saved
    }

    #[must_use]
    pub fn history(&self) -> &[ChangeRecord] {
        &self.history
    }

    /// Diff the live record against the clean snapshot.
    #[must_use]
    pub fn changes(&self, current: &Record, ignore: &IgnoreSet) -> ChangeSet {
        diff(&self.snapshot, current, ignore)
    }

    /// Diff the live record against the last observed state.
    #[must_use]
    pub fn pending(&self, current: &Record, ignore: &IgnoreSet) -> ChangeSet {
        diff(&self.observed, current, ignore)
    }

    /// Accept `current` as observed and bump `last_modified`.
    pub fn observe(&mut self, current: &Record, now: u64) -> u64 {
        self.observed = current.clone();
        self.last_modified = next_timestamp(self.last_modified, now);
        self.last_modified
    }

    /// Accept `current` as observed without counting it as a modification.
    pub fn sync_observed(&mut self, current: &Record) {
        self.observed = current.clone();
    }

    /// Mark `current` clean.
    pub fn reset_snapshot(&mut self, current: &Record) {
        self.snapshot = current.clone();
        self.observed = current.clone();
    }

    pub fn mark_saved(&mut self, now: u64) {
        self.last_saved = Some(now);
    }

    pub fn push_history(&mut self, entry: ChangeRecord) {
        self.history.push(entry);
    }
}
