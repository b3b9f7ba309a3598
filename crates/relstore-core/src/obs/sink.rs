//! Metrics sink boundary.
//!
//! Engine logic records `MetricsEvent`s; `MetricsCounters` is the default
//! in-process sink every store carries. Hosts may attach an extra sink to
//! forward events elsewhere.

use crate::obs::metrics::{EventReport, EventState};
use parking_lot::Mutex;

///
/// MutationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationKind {
    Insert,
    Merge,
    Replace,
    Remove,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    Mutation {
        collection: &'a str,
        kind: MutationKind,
    },
    IndexDelta {
        collection: &'a str,
        inserts: u64,
        removes: u64,
    },
    Linked {
        collection: &'a str,
        recomputed: u64,
        stripped: u64,
    },
    ChangeDetected {
        collection: &'a str,
    },
    Query {
        collection: &'a str,
        rows_scanned: u64,
        rows_returned: u64,
    },
    Reap {
        collection: &'a str,
        expired: u64,
        ejected: u64,
    },
    CacheHit {
        collection: &'a str,
    },
    FetchStarted {
        collection: &'a str,
    },
    FetchJoined {
        collection: &'a str,
    },
    FetchFailed {
        collection: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// MetricsCounters
/// Default sink: saturating counters, global and per collection.
///

#[derive(Debug, Default)]
pub struct MetricsCounters {
    state: Mutex<EventState>,
}

impl MetricsCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> EventReport {
        EventReport::from(&*self.state.lock())
    }

    pub fn reset(&self) {
        *self.state.lock() = EventState::default();
    }
}

impl MetricsSink for MetricsCounters {
    fn record(&self, event: MetricsEvent<'_>) {
        let mut m = self.state.lock();

        match event {
            MetricsEvent::Mutation { collection, kind } => {
                let ops = &mut m.ops;
                match kind {
                    MutationKind::Insert => ops.inserts = ops.inserts.saturating_add(1),
                    MutationKind::Merge => ops.merges = ops.merges.saturating_add(1),
                    MutationKind::Replace => ops.replaces = ops.replaces.saturating_add(1),
                    MutationKind::Remove => ops.removes = ops.removes.saturating_add(1),
                }

                let entry = m.entry(collection);
                match kind {
                    MutationKind::Insert => entry.inserts = entry.inserts.saturating_add(1),
                    MutationKind::Merge => entry.merges = entry.merges.saturating_add(1),
                    MutationKind::Replace => entry.replaces = entry.replaces.saturating_add(1),
                    MutationKind::Remove => entry.removes = entry.removes.saturating_add(1),
                }
            }

            MetricsEvent::IndexDelta {
                collection: _,
                inserts,
                removes,
            } => {
                m.ops.index_inserts = m.ops.index_inserts.saturating_add(inserts);
                m.ops.index_removes = m.ops.index_removes.saturating_add(removes);
            }

            MetricsEvent::Linked {
                collection: _,
                recomputed,
                stripped,
            } => {
                m.ops.links_recomputed = m.ops.links_recomputed.saturating_add(recomputed);
                m.ops.links_stripped = m.ops.links_stripped.saturating_add(stripped);
            }

            MetricsEvent::ChangeDetected { collection } => {
                m.ops.changes_detected = m.ops.changes_detected.saturating_add(1);
                let entry = m.entry(collection);
                entry.changes_detected = entry.changes_detected.saturating_add(1);
            }

            MetricsEvent::Query {
                collection,
                rows_scanned,
                rows_returned,
            } => {
                m.ops.queries = m.ops.queries.saturating_add(1);
                m.ops.rows_scanned = m.ops.rows_scanned.saturating_add(rows_scanned);
                m.ops.rows_returned = m.ops.rows_returned.saturating_add(rows_returned);
                let entry = m.entry(collection);
                entry.queries = entry.queries.saturating_add(1);
            }

            MetricsEvent::Reap {
                collection,
                expired,
                ejected,
            } => {
                m.ops.reap_sweeps = m.ops.reap_sweeps.saturating_add(1);
                m.ops.records_expired = m.ops.records_expired.saturating_add(expired);
                m.ops.records_ejected = m.ops.records_ejected.saturating_add(ejected);
                let entry = m.entry(collection);
                entry.records_expired = entry.records_expired.saturating_add(expired);
                entry.records_ejected = entry.records_ejected.saturating_add(ejected);
            }

            MetricsEvent::CacheHit { collection } => {
                m.ops.cache_hits = m.ops.cache_hits.saturating_add(1);
                let entry = m.entry(collection);
                entry.cache_hits = entry.cache_hits.saturating_add(1);
            }

            MetricsEvent::FetchStarted { collection } => {
                m.ops.fetches_started = m.ops.fetches_started.saturating_add(1);
                let entry = m.entry(collection);
                entry.fetches_started = entry.fetches_started.saturating_add(1);
            }

            MetricsEvent::FetchJoined { collection: _ } => {
                m.ops.fetches_joined = m.ops.fetches_joined.saturating_add(1);
            }

            MetricsEvent::FetchFailed { collection: _ } => {
                m.ops.fetch_failures = m.ops.fetch_failures.saturating_add(1);
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_global_and_per_collection() {
        let counters = MetricsCounters::new();
        counters.record(MetricsEvent::Mutation {
            collection: "users",
            kind: MutationKind::Insert,
        });
        counters.record(MetricsEvent::Mutation {
            collection: "posts",
            kind: MutationKind::Insert,
        });
        counters.record(MetricsEvent::Reap {
            collection: "users",
            expired: 3,
            ejected: 2,
        });

        let report = counters.report();
        assert_eq!(report.ops.inserts, 2);
        assert_eq!(report.ops.records_ejected, 2);
        assert_eq!(report.collections["users"].inserts, 1);
        assert_eq!(report.collections["users"].records_expired, 3);

        counters.reset();
        assert_eq!(counters.report(), EventReport::default());
    }
}
