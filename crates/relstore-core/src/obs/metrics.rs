use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// EventState
/// Ephemeral, in-memory counters for one store.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub ops: EventOps,
    pub collections: BTreeMap<String, CollectionCounters>,
}

impl EventState {
    pub(crate) fn entry(&mut self, collection: &str) -> &mut CollectionCounters {
        self.collections.entry(collection.to_string()).or_default()
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Mutations
    pub inserts: u64,
    pub merges: u64,
    pub replaces: u64,
    pub removes: u64,

    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,

    // Relation linking
    pub links_recomputed: u64,
    pub links_stripped: u64,

    // Change tracking
    pub changes_detected: u64,

    // Queries
    pub queries: u64,
    pub rows_scanned: u64,
    pub rows_returned: u64,

    // Expiry
    pub reap_sweeps: u64,
    pub records_expired: u64,
    pub records_ejected: u64,

    // Fetch boundary
    pub cache_hits: u64,
    pub fetches_started: u64,
    pub fetches_joined: u64,
    pub fetch_failures: u64,
}

///
/// CollectionCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CollectionCounters {
    pub inserts: u64,
    pub merges: u64,
    pub replaces: u64,
    pub removes: u64,
    pub changes_detected: u64,
    pub queries: u64,
    pub records_expired: u64,
    pub records_ejected: u64,
    pub cache_hits: u64,
    pub fetches_started: u64,
}

///
/// EventReport
/// Point-in-time copy of the counters.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub collections: BTreeMap<String, CollectionCounters>,
}

impl From<&EventState> for EventReport {
    fn from(state: &EventState) -> Self {
        Self {
            ops: state.ops.clone(),
            collections: state.collections.clone(),
        }
    }
}
