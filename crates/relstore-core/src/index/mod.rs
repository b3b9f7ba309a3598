//! Ordered indexes: sorted `(key, handle)` vectors searched by bisection.
//!
//! Indexes have no mutation observers of their own. Whoever changes an indexed
//! field must remove the entry under its old key and re-insert it under the
//! new one; keys are never updated in place.

mod key;

#[cfg(test)]
mod tests;

use crate::{
    arena::Handle,
    error::{Error, ErrorKind, ErrorOrigin},
    record::Record,
    value::Value,
};
use std::cmp::Ordering;
use thiserror::Error as ThisError;

// re-exports
pub use key::IndexKey;

///
/// IndexError
///

#[derive(Debug, ThisError)]
pub enum IndexError {
    #[error("index '{index}' has no entry for {handle} under key {key}")]
    NotFound {
        index: String,
        key: IndexKey,
        handle: Handle,
    },
}

impl From<IndexError> for Error {
    fn from(err: IndexError) -> Self {
        Self::new(ErrorKind::RecordNotFound, ErrorOrigin::Index, err.to_string())
    }
}

///
/// RangeOptions
///
/// Bounds inclusivity and paging for `between` scans.
/// Defaults: left-inclusive, right-exclusive, unbounded page.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangeOptions {
    pub left_inclusive: bool,
    pub right_inclusive: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            left_inclusive: true,
            right_inclusive: false,
            offset: 0,
            limit: None,
        }
    }
}

impl RangeOptions {
    #[must_use]
    pub const fn inclusive() -> Self {
        Self {
            left_inclusive: true,
            right_inclusive: true,
            offset: 0,
            limit: None,
        }
    }
}

///
/// IndexEntry
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    pub key: IndexKey,
    pub handle: Handle,
}

///
/// OrderedIndex
///
/// Ascending sequence of entries; equal keys keep insertion order.
///

#[derive(Clone, Debug)]
pub struct OrderedIndex {
    name: String,
    fields: Vec<String>,
    entries: Vec<IndexEntry>,
}

impl OrderedIndex {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
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
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Handles in index order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.iter().map(|entry| entry.handle)
    }

    /// Derive this index's key from a record's current field values.
    #[must_use]
    pub fn key_for(&self, record: &Record) -> IndexKey {
        IndexKey::new(
            self.fields
                .iter()
                .map(|field| record.value(field).clone())
                .collect(),
        )
    }

    /// True when the record carries at least one indexed field.
    #[must_use]
    pub fn covers(&self, record: &Record) -> bool {
        self.fields.iter().any(|field| record.contains_key(field))
    }

    /// Insert after any existing entries with an equal key.
    pub fn insert(&mut self, key: IndexKey, handle: Handle) {
        let at = self
            .entries
            .partition_point(|entry| entry.key.cmp(&key) != Ordering::Greater);
        self.entries.insert(at, IndexEntry { key, handle });
    }

    /// Remove the entry for `handle`, located through the key it was inserted
    /// under and then matched by identity among equal keys.
    pub fn remove(&mut self, key: &IndexKey, handle: Handle) -> Result<(), IndexError> {
        let start = self
            .entries
            .partition_point(|entry| entry.key.cmp(key) == Ordering::Less);

        let found = self.entries[start..]
            .iter()
            .take_while(|entry| entry.key.cmp(key) == Ordering::Equal)
            .position(|entry| entry.handle == handle);

        match found {
            Some(offset) => {
                self.entries.remove(start + offset);
                Ok(())
            }
            None => Err(IndexError::NotFound {
                index: self.name.clone(),
                key: key.clone(),
                handle,
            }),
        }
    }

    /// All entries whose leading components equal `lookup`.
    #[must_use]
    pub fn get(&self, lookup: &[Value]) -> &[IndexEntry] {
        let start = self
            .entries
            .partition_point(|entry| entry.key.cmp_prefix(lookup) == Ordering::Less);
        let end = self
            .entries
            .partition_point(|entry| entry.key.cmp_prefix(lookup) != Ordering::Greater);

        if start < end {
            &self.entries[start..end]
        } else {
            &[]
        }
    }

    /// Contiguous slice between two (prefix) bounds; `None` is unbounded.
    #[must_use]
    pub fn range(
        &self,
        left: Option<&[Value]>,
        right: Option<&[Value]>,
        opts: RangeOptions,
    ) -> &[IndexEntry] {
        let start = left.map_or(0, |left| {
            self.entries.partition_point(|entry| {
                let cmp = entry.key.cmp_prefix(left);
                if opts.left_inclusive {
                    cmp == Ordering::Less
                } else {
                    cmp != Ordering::Greater
                }
            })
        });
        let end = right.map_or(self.entries.len(), |right| {
            self.entries.partition_point(|entry| {
                let cmp = entry.key.cmp_prefix(right);
                if opts.right_inclusive {
                    cmp != Ordering::Greater
                } else {
                    cmp == Ordering::Less
                }
            })
        });

        if start >= end {
            return &[];
        }

        let slice = &self.entries[start..end];
        let from = opts.offset.min(slice.len());
        let to = opts
            .limit
            .map_or(slice.len(), |limit| from.saturating_add(limit).min(slice.len()));

        &slice[from..to]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
