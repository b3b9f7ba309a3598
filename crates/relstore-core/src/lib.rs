//! Core engine for relstore: records, ordered indexes, the query pipeline,
//! relation linking, change tracking and TTL expiry, all behind a
//! synchronous [`Store`](store::Store).
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod arena;
pub mod change;
pub mod clock;
pub mod collection;
pub mod config;
pub mod error;
pub mod event;
pub mod expiry;
pub mod index;
pub mod obs;
pub mod query;
pub mod record;
pub mod relation;
pub mod store;
pub mod value;

///
/// Prelude
///
/// Domain vocabulary only; errors and metrics stay in their modules.
///

pub mod prelude {
    pub use crate::{
        arena::Handle,
        change::{ChangeOptions, ChangeSet, ComputedProperty},
        collection::{CollectionDef, QueryKey},
        config::{CollectionConfig, IgnoreRule, IndexDef, OnConflict, ReapAction},
        event::{Event, EventKind, EventScope},
        index::RangeOptions,
        query::{Direction, Operator, Query},
        record::Record,
        relation::{Related, RelationDescriptor},
        store::{AddOptions, ReapReport, Store},
        value::Value,
    };
}
