//! Collections: one arena of records plus its ordered indexes.
//!
//! A collection owns the primary index (by record key), the named secondary
//! indexes, the expiry heap and the completed-query map for its records.
//! It knows nothing about other collections; cross-collection work (links,
//! events) is sequenced by the store.

mod def;
mod set;


use crate::{
    arena::{Arena, Handle},
    change::{ChangeRecord, ChangeSet, ComputedProperty, IgnoreSet, Tracking, next_timestamp},
    config::{CollectionConfig, IndexDef, OnConflict},
    error::{Error, ErrorOrigin},
    expiry::{ExpiryHeap, HeapEntry},
    index::{IndexKey, OrderedIndex, RangeOptions},
    query::{self, Query, QueryFingerprint},
    record::Record,
    relation::RelationDescriptor,
    value::{Value, canonical_cmp},
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
};

// re-exports
pub use def::{CollectionDef, FilterFn};
pub use set::{CollectionId, CollectionSet};

///
/// QueryKey
///
/// Key of the completed/pending query-state maps: a record key for point
/// lookups, or the fingerprint of a query's parameters.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum QueryKey {
    Record(Value),
    Query(QueryFingerprint),
}

impl From<&Query> for QueryKey {
    fn from(query: &Query) -> Self {
        Self::Query(query.fingerprint())
    }
}

///
/// Upsert
///
/// How `upsert` resolved record identity.
///

#[derive(Debug)]
pub enum Upsert {
    Inserted(Handle),
    Merged {
        handle: Handle,
        before: Record,
    },
    Replaced {
        old: Handle,
        removed: Removed,
        handle: Handle,
    },
}

impl Upsert {
    /// Handle of the record now stored.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        match self {
            Self::Inserted(handle)
            | Self::Merged { handle, .. }
            | Self::Replaced { handle, .. } => *handle,
        }
    }
}

///
/// Removed
///
/// What remains of a record after it leaves its collection.
///

#[derive(Debug)]
pub struct Removed {
    pub record: Record,
    pub tracking: Tracking,
}

///
/// Observed
///
/// Outcome of a change-detection pass over one record.
///

#[derive(Clone, Debug)]
pub struct Observed {
    pub changes: ChangeSet,
    pub key: Value,
    pub timestamp: u64,
}

///
/// IndexDelta
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IndexDelta {
    pub inserts: u64,
    pub removes: u64,
}

impl IndexDelta {
    const fn add(&mut self, other: Self) {
        self.inserts += other.inserts;
        self.removes += other.removes;
    }
}

// Physical record slot. `primary` and `keys` hold the exact keys each index
// currently files this record under, so removal never depends on the live
// (possibly mutated) field values.
#[derive(Debug)]
struct Slot {
    record: Record,
    primary: Option<IndexKey>,
    keys: BTreeMap<String, IndexKey>,
    tracking: Tracking,
}

///
/// Collection
///

pub struct Collection {
    name: String,
    config: CollectionConfig,
    ignore: IgnoreSet,
    computed: Vec<ComputedProperty>,
    filter: Option<FilterFn>,

    slots: Arena<Slot>,
    primary: OrderedIndex,
    indexes: BTreeMap<String, OrderedIndex>,
    unsaved: Vec<Handle>,

    expiry: ExpiryHeap,
    completed: HashMap<QueryKey, u64>,

    last_modified: u64,
    history: Vec<ChangeRecord>,
}

impl Collection {
    pub fn new(def: CollectionDef) -> Result<Self, Error> {
        let CollectionDef {
            name,
            config,
            computed,
            filter,
        } = def;

        if name.is_empty() {
            return Err(Error::invalid_argument(
                ErrorOrigin::Collection,
                "collection name is empty",
            ));
        }
        for relation in &config.relations {
            relation.validate(&name)?;
        }

        let ignore = IgnoreSet::compile(&config.ignored_changes)?
            .with_fields(computed.iter().map(|c| c.field().to_string()));
        let primary = OrderedIndex::new("primary", vec![config.id_attribute.clone()]);

        let mut collection = Self {
            name,
            config,
            ignore,
            computed,
            filter,
            slots: Arena::new(),
            primary,
            indexes: BTreeMap::new(),
            unsaved: Vec::new(),
            expiry: ExpiryHeap::new(),
            completed: HashMap::new(),
            last_modified: 0,
            history: Vec::new(),
        };

        for def in collection.config.indexes.clone() {
            collection.create_index(def)?;
        }

        Ok(collection)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &CollectionConfig {
        &self.config
    }

    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.config.id_attribute
    }

    #[must_use]
    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.config.relations
    }

    /// Position of the relation exposed as `field`.
    #[must_use]
    pub fn relation_index(&self, field: &str) -> Option<usize> {
        self.config
            .relations
            .iter()
            .position(|r| r.local_field == field)
    }

    #[must_use]
    pub const fn ignore_set(&self) -> &IgnoreSet {
        &self.ignore
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.contains(handle)
    }

    #[must_use]
    pub fn record(&self, handle: Handle) -> Option<&Record> {
        self.slots.get(handle).map(|slot| &slot.record)
    }

    /// Mutable access for push-style hosts; the caller must notify the store.
    pub(crate) fn record_mut(&mut self, handle: Handle) -> Option<&mut Record> {
        self.slots.get_mut(handle).map(|slot| &mut slot.record)
    }

    #[must_use]
    pub fn tracking(&self, handle: Handle) -> Option<&Tracking> {
        self.slots.get(handle).map(|slot| &slot.tracking)
    }

    pub(crate) fn tracking_mut(&mut self, handle: Handle) -> Option<&mut Tracking> {
        self.slots.get_mut(handle).map(|slot| &mut slot.tracking)
    }

    /// Record key, if the record has one.
    #[must_use]
    pub fn key_of(&self, record: &Record) -> Option<Value> {
        let key = record.value(&self.config.id_attribute);

        (!key.is_null()).then(|| key.clone())
    }

    #[must_use]
    pub const fn primary_index(&self) -> &OrderedIndex {
        &self.primary
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&OrderedIndex> {
        self.indexes.get(name)
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Records without a key, in insertion order.
    #[must_use]
    pub fn unsaved(&self) -> &[Handle] {
        &self.unsaved
    }

    /// Keyed records in primary order, then unsaved records.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.primary.handles().chain(self.unsaved.iter().copied())
    }

    pub fn records(&self) -> impl Iterator<Item = (Handle, &Record)> + '_ {
        self.handles()
            .filter_map(|handle| self.record(handle).map(|record| (handle, record)))
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Point lookup through the primary index.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<Handle> {
        if key.is_null() {
            return None;
        }

        self.primary
            .get(std::slice::from_ref(key))
            .first()
            .map(|entry| entry.handle)
    }

    /// Union of matches for each lookup, in lookup order then index order.
    ///
    /// A list lookup is matched as a composite-key prefix. With no lookups the
    /// whole index is returned (for the primary index, unsaved records follow).
    pub fn get_all(&self, lookups: &[Value], index: Option<&str>) -> Result<Vec<Handle>, Error> {
        let target = self.resolve_index(index)?;

        if lookups.is_empty() {
            let mut out: Vec<Handle> = target.handles().collect();
            if index.is_none() {
                out.extend(self.unsaved.iter().copied());
            }
            return Ok(out);
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for lookup in lookups {
            let parts = match lookup {
                Value::List(parts) if target.fields().len() > 1 => parts.as_slice(),
                other => std::slice::from_ref(other),
            };
            for entry in target.get(parts) {
                if seen.insert(entry.handle) {
                    out.push(entry.handle);
                }
            }
        }

        Ok(out)
    }

    /// Range scan between two key prefixes.
    pub fn between(
        &self,
        left: &[Value],
        right: &[Value],
        index: Option<&str>,
        opts: RangeOptions,
    ) -> Result<Vec<Handle>, Error> {
        let target = self.resolve_index(index)?;

        Ok(target
            .range(Some(left), Some(right), opts)
            .iter()
            .map(|entry| entry.handle)
            .collect())
    }

    /// Records whose `field` equals `value` under canonical ordering.
    ///
    /// Uses the primary index or a single-field secondary index when one
    /// exists, and a scan otherwise.
    #[must_use]
    pub fn find_by(&self, field: &str, value: &Value) -> Vec<Handle> {
        if value.is_null() {
            return Vec::new();
        }
        if field == self.config.id_attribute {
            return self.get(value).into_iter().collect();
        }

        let lookup = std::slice::from_ref(value);
        if let Some(index) = self.single_field_index(field) {
            return index.get(lookup).iter().map(|entry| entry.handle).collect();
        }

        self.records()
            .filter(|(_, record)| canonical_cmp(record.value(field), value) == Ordering::Equal)
            .map(|(handle, _)| handle)
            .collect()
    }

    fn single_field_index(&self, field: &str) -> Option<&OrderedIndex> {
        self.indexes
            .values()
            .find(|index| index.fields().len() == 1 && index.fields()[0] == field)
    }

    fn resolve_index(&self, name: Option<&str>) -> Result<&OrderedIndex, Error> {
        match name {
            None => Ok(&self.primary),
            Some(name) => self.indexes.get(name).ok_or_else(|| {
                Error::invalid_argument(
                    ErrorOrigin::Index,
                    format!("unknown index '{name}' on '{}'", self.name),
                )
            }),
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert, or resolve against an existing record with the same key using
    /// `policy`.
    pub fn upsert(
        &mut self,
        record: Record,
        policy: OnConflict,
        now: u64,
    ) -> Result<Upsert, Error> {
        let existing = self.key_of(&record).and_then(|key| self.get(&key));

        let Some(existing) = existing else {
            let handle = self.insert(record, now)?;
            return Ok(Upsert::Inserted(handle));
        };

        match policy {
            OnConflict::Merge => {
                let slot = self
                    .slots
                    .get_mut(existing)
                    .ok_or_else(|| Error::stale_handle(&self.name))?;
                let before = slot.record.clone();
                slot.record.merge(&record);
                if let Err(err) = self.update_indexes(existing) {
                    self.restore(existing, before);
                    return Err(err);
                }

                Ok(Upsert::Merged {
                    handle: existing,
                    before,
                })
            }
            OnConflict::Replace => {
                let removed = self
                    .remove(existing)
                    .ok_or_else(|| Error::stale_handle(&self.name))?;
                let handle = self.insert(record, now)?;

                Ok(Upsert::Replaced {
                    old: existing,
                    removed,
                    handle,
                })
            }
        }
    }

    // New slot; computed properties are evaluated before the first snapshot.
    fn insert(&mut self, mut record: Record, now: u64) -> Result<Handle, Error> {
        for computed in &self.computed {
            computed.apply(&mut record);
        }

        if let Some(key) = self.key_of(&record)
            && self.get(&key).is_some()
        {
            return Err(Error::conflict(
                ErrorOrigin::Collection,
                format!("duplicate key {key} in '{}'", self.name),
            ));
        }

        let tracking = Tracking::new(&record, now);
        let handle = self.slots.insert(Slot {
            record,
            primary: None,
            keys: BTreeMap::new(),
            tracking,
        });
        self.unsaved.push(handle);
        self.update_indexes(handle)?;
        self.last_modified = next_timestamp(self.last_modified, now);

        Ok(handle)
    }

    /// Detach a record from every index, the expiry heap and the arena.
    pub fn remove(&mut self, handle: Handle) -> Option<Removed> {
        let slot = self.slots.remove(handle)?;

        match &slot.primary {
            Some(key) => {
                let filed = self.primary.remove(key, handle);
                debug_assert!(filed.is_ok(), "primary index lost {handle}");
            }
            None => self.unsaved.retain(|h| *h != handle),
        }
        for (name, key) in &slot.keys {
            if let Some(index) = self.indexes.get_mut(name) {
                let filed = index.remove(key, handle);
                debug_assert!(filed.is_ok(), "index '{name}' lost {handle}");
            }
        }
        self.expiry.remove(handle);
        if let Some(primary) = &slot.primary
            && let Some(key) = primary.first()
        {
            self.completed.remove(&QueryKey::Record(key.clone()));
        }

        Some(Removed {
            record: slot.record,
            tracking: slot.tracking,
        })
    }

    /// Re-file a record in the primary index and every secondary index.
    ///
    /// Fails with a conflict, leaving all indexes untouched, when the record's
    /// key now collides with another record.
    pub fn update_indexes(&mut self, handle: Handle) -> Result<IndexDelta, Error> {
        let mut delta = self.update_primary(handle)?;
        let names: Vec<String> = self.indexes.keys().cloned().collect();
        for name in names {
            delta.add(self.update_index(handle, &name)?);
        }

        Ok(delta)
    }

    fn update_primary(&mut self, handle: Handle) -> Result<IndexDelta, Error> {
        let slot = self
            .slots
            .get(handle)
            .ok_or_else(|| Error::stale_handle(&self.name))?;
        let next = self.key_of(&slot.record).map(IndexKey::single);

        if same_key(slot.primary.as_ref(), next.as_ref()) {
            return Ok(IndexDelta::default());
        }
        if let Some(next) = &next
            && self.primary.get(next).iter().any(|entry| entry.handle != handle)
        {
            return Err(Error::conflict(
                ErrorOrigin::Index,
                format!("key {next} already exists in '{}'", self.name),
            ));
        }

        let mut delta = IndexDelta::default();
        let previous = slot.primary.clone();
        match &previous {
            Some(key) => {
                self.primary.remove(key, handle)?;
                delta.removes += 1;
            }
            None => self.unsaved.retain(|h| *h != handle),
        }
        match &next {
            Some(key) => {
                self.primary.insert(key.clone(), handle);
                delta.inserts += 1;
            }
            None => self.unsaved.push(handle),
        }
        if let Some(slot) = self.slots.get_mut(handle) {
            slot.primary = next;
        }

        Ok(delta)
    }

    /// Re-file a record in one secondary index after a field mutation.
    pub fn update_index(&mut self, handle: Handle, name: &str) -> Result<IndexDelta, Error> {
        let index = self.indexes.get_mut(name).ok_or_else(|| {
            Error::invalid_argument(
                ErrorOrigin::Index,
                format!("unknown index '{name}' on '{}'", self.name),
            )
        })?;
        let slot = self
            .slots
            .get_mut(handle)
            .ok_or_else(|| Error::stale_handle(&self.name))?;

        let next = index
            .covers(&slot.record)
            .then(|| index.key_for(&slot.record));
        let previous = slot.keys.get(name);
        if same_key(previous, next.as_ref()) {
            return Ok(IndexDelta::default());
        }

        let mut delta = IndexDelta::default();
        if let Some(key) = slot.keys.remove(name) {
            index.remove(&key, handle)?;
            delta.removes += 1;
        }
        if let Some(key) = next {
            index.insert(key.clone(), handle);
            slot.keys.insert(name.to_string(), key);
            delta.inserts += 1;
        }

        Ok(delta)
    }

    /// Build a secondary index over every current record.
    ///
    /// Re-creating an index with the same fields is a no-op.
    pub fn create_index(&mut self, def: IndexDef) -> Result<(), Error> {
        if def.fields.is_empty() {
            return Err(Error::invalid_argument(
                ErrorOrigin::Index,
                format!("index '{}' has no fields", def.name),
            ));
        }
        if let Some(existing) = self.indexes.get(&def.name) {
            if existing.fields() == def.fields.as_slice() {
                return Ok(());
            }
            return Err(Error::invalid_argument(
                ErrorOrigin::Index,
                format!("index '{}' already exists on '{}'", def.name, self.name),
            ));
        }

        let mut index = OrderedIndex::new(def.name.clone(), def.fields);
        let handles: Vec<Handle> = self.slots.iter().map(|(h, _)| h).collect();
        for handle in handles {
            if let Some(slot) = self.slots.get_mut(handle)
                && index.covers(&slot.record)
            {
                let key = index.key_for(&slot.record);
                index.insert(key.clone(), handle);
                slot.keys.insert(def.name.clone(), key);
            }
        }
        self.indexes.insert(def.name, index);

        Ok(())
    }

    /// Ensure a single-field index exists on `field`; used for join lookups.
    pub(crate) fn ensure_field_index(&mut self, field: &str) -> Result<(), Error> {
        if field == self.config.id_attribute
            || self.single_field_index(field).is_some()
            || self.indexes.contains_key(field)
        {
            return Ok(());
        }

        self.create_index(IndexDef::new(field, [field]))
    }

    /// Diff a record against its last observed state and, if anything
    /// moved, recompute dependents, bump timestamps and append history.
    pub(crate) fn observe(&mut self, handle: Handle, now: u64) -> Result<Option<Observed>, Error> {
        let slot = self
            .slots
            .get_mut(handle)
            .ok_or_else(|| Error::stale_handle(&self.name))?;

        let changes = slot.tracking.pending(&slot.record, &self.ignore);
        if changes.is_empty() {
            slot.tracking.sync_observed(&slot.record);
            return Ok(None);
        }

        let mut recomputed = false;
        for computed in &self.computed {
            if computed.affected_by(&changes) {
                recomputed |= computed.apply(&mut slot.record);
            }
        }

        let timestamp = slot.tracking.observe(&slot.record, now);
        let key = slot.record.value(&self.config.id_attribute).clone();
        if self.config.keep_change_history {
            let entry = ChangeRecord {
                target: handle,
                key: key.clone(),
                changes: changes.clone(),
                timestamp,
            };
            slot.tracking.push_history(entry.clone());
            self.history.push(entry);
        }
        self.last_modified = next_timestamp(self.last_modified, timestamp);

        if recomputed {
            self.update_indexes(handle)?;
        }

        Ok(Some(Observed {
            changes,
            key,
            timestamp,
        }))
    }

    /// Restore a record's fields, e.g. after a rejected mutation.
    pub(crate) fn restore(&mut self, handle: Handle, record: Record) {
        if let Some(slot) = self.slots.get_mut(handle) {
            slot.record = record;
        }
    }

    // ------------------------------------------------------------------
    // Timestamps / history
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn last_modified(&self) -> u64 {
        self.last_modified
    }

    #[must_use]
    pub fn history(&self) -> &[ChangeRecord] {
        &self.history
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    /// Run the query pipeline (or the custom filter) over every record.
    pub fn filter(&self, query: &Query) -> Result<Vec<Handle>, Error> {
        let items: Vec<(Handle, &Record)> = self.records().collect();

        let out = match &self.filter {
            Some(custom) => custom(items, query),
            None => query::filter(items, query, |(_, record)| *record)?,
        };

        Ok(out.into_iter().map(|(handle, _)| handle).collect())
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(Handle, &Record),
    {
        for (handle, record) in self.records() {
            f(handle, record);
        }
    }

    pub fn map<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(Handle, &Record) -> T,
    {
        self.records().map(|(handle, record)| f(handle, record)).collect()
    }

    pub fn reduce<T, F>(&self, init: T, mut f: F) -> T
    where
        F: FnMut(T, Handle, &Record) -> T,
    {
        self.records()
            .fold(init, |acc, (handle, record)| f(acc, handle, record))
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    /// (Re-)arm the record's expiry entry from `now`.
    pub fn arm_expiry(&mut self, handle: Handle, now: u64) {
        if self.slots.contains(handle) {
            self.expiry
                .push(HeapEntry::new(handle, now, self.config.max_age));
        }
    }

    #[must_use]
    pub fn expiry_entry(&self, handle: Handle) -> Option<&HeapEntry> {
        self.expiry.get(handle)
    }

    #[must_use]
    pub fn is_expired(&self, handle: Handle, now: u64) -> bool {
        self.expiry
            .get(handle)
            .is_some_and(|entry| entry.is_expired(now))
    }

    pub(crate) fn drain_expired(&mut self, now: u64) -> Vec<HeapEntry> {
        self.expiry.drain_expired(now)
    }

    pub(crate) fn restore_expiry(&mut self, entry: HeapEntry) {
        if self.slots.contains(entry.handle) {
            self.expiry.push(entry);
        }
    }

    // ------------------------------------------------------------------
    // Query state
    // ------------------------------------------------------------------

    pub fn mark_completed(&mut self, key: QueryKey, now: u64) {
        self.completed.insert(key, now);
    }

    #[must_use]
    pub fn completed_at(&self, key: &QueryKey) -> Option<u64> {
        self.completed.get(key).copied()
    }

    pub fn clear_completed(&mut self, key: &QueryKey) -> Option<u64> {
        self.completed.remove(key)
    }

    /// Forget every completed list query; point lookups are kept.
    pub fn clear_completed_queries(&mut self) {
        self.completed
            .retain(|key, _| matches!(key, QueryKey::Record(_)));
    }
}

fn same_key(left: Option<&IndexKey>, right: Option<&IndexKey>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
