//! ## Crate layout
//! - `core`: the synchronous engine (records, indexes, queries, relations,
//!   change tracking, expiry) re-exported from `relstore-core`.
//! - `adapter`: the boundary trait for the backing source.
//! - `datastore`: the async facade with single-flight fetches.
//! - `reaper`: background reap loops driven by each collection's interval.

pub use relstore_core as core;

pub mod adapter;
pub mod datastore;
pub mod reaper;

pub use adapter::Adapter;
pub use datastore::{DataStore, FetchOptions};
pub use reaper::ReaperHandle;
pub use relstore_core::error::{AdapterError, Error, ErrorKind};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{Adapter, DataStore, FetchOptions, ReaperHandle};
    pub use relstore_core::prelude::*;
}
