//! The store: every collection, the relation graph and the event bus.
//!
//! All mutation is synchronous. Within one mutation the order is fixed:
//! indexes, then relation links, then change detection (timestamps, computed
//! properties, history, events), then the expiry heap. Queued events are
//! delivered after the whole call completes.

mod relate;

#[cfg(test)]
mod tests;

use crate::{
    arena::Handle,
    change::{ChangeOptions, ChangeRecord, ChangeSet, IgnoreSet},
    clock::{Clock, SystemClock},
    collection::{Collection, CollectionDef, CollectionId, CollectionSet, QueryKey, Removed, Upsert},
    config::{IndexDef, OnConflict, ReapAction},
    error::{Error, ErrorOrigin},
    event::{Event, EventBus, EventKind, EventScope, Listener, SubscriptionId, deliver},
    index::RangeOptions,
    obs::{EventReport, MetricsCounters, MetricsEvent, MetricsSink, MutationKind},
    query::Query,
    record::Record,
    relation::{RelationGraph, RelationKey, RelationKind},
    value::Value,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

///
/// AddOptions
///

#[derive(Clone, Copy, Debug)]
pub struct AddOptions {
    /// Override the collection's conflict policy for this call.
    pub on_conflict: Option<OnConflict>,

    /// Treat the input as clean data from the backing source: a re-added
    /// record gets a fresh snapshot (when the collection resets on sync).
    pub sync: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            on_conflict: None,
            sync: true,
        }
    }
}

impl AddOptions {
    #[must_use]
    pub const fn with_on_conflict(mut self, policy: OnConflict) -> Self {
        self.on_conflict = Some(policy);
        self
    }

    #[must_use]
    pub const fn local(mut self) -> Self {
        self.sync = false;
        self
    }
}

///
/// ReapReport
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReapReport {
    /// Every handle whose entry had expired, soonest first.
    pub expired: Vec<Handle>,

    /// Records removed by an `eject` disposition.
    pub ejected: Vec<Record>,

    /// Keys awaiting a re-fetch under a `refresh` disposition.
    pub refresh: Vec<Value>,
}

impl ReapReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }
}

///
/// Store
///

pub struct Store {
    collections: CollectionSet,
    graph: RelationGraph,
    events: EventBus,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCounters>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            collections: CollectionSet::new(),
            graph: RelationGraph::new(),
            events: EventBus::new(),
            clock,
            metrics: Arc::new(MetricsCounters::new()),
            sink: None,
        }
    }

    /// Forward every metrics event to `sink` as well as the built-in counters.
    #[must_use]
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    #[cfg(test)]
    pub(crate) const fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    #[must_use]
    pub fn metrics_report(&self) -> EventReport {
        self.metrics.report()
    }

    pub fn record_metric(&self, event: MetricsEvent<'_>) {
        self.metrics.record(event);
        if let Some(sink) = &self.sink {
            sink.record(event);
        }
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn define_collection(&mut self, def: CollectionDef) -> Result<CollectionId, Error> {
        let collection = Collection::new(def)?;
        let id = self.collections.insert(collection)?;
        self.ensure_join_indexes()?;

        debug!(collection = %self.collections.get(id).name(), "collection defined");

        Ok(id)
    }

    // Single-field indexes for every join field whose collection exists,
    // so inverse discovery is a bisection instead of a scan.
    fn ensure_join_indexes(&mut self) -> Result<(), Error> {
        let mut wanted: Vec<(CollectionId, String)> = Vec::new();
        for (id, collection) in self.collections.iter() {
            for desc in collection.relations() {
                let Some(target) = self.collections.id_of(&desc.target) else {
                    continue;
                };
                match (&desc.kind, &desc.key) {
                    (RelationKind::BelongsTo, key) => {
                        wanted.push((id, key.field().to_string()));
                    }
                    (_, RelationKey::ForeignKey(fk)) => {
                        wanted.push((target, fk.clone()));
                    }
                    _ => {}
                }
            }
        }

        for (id, field) in wanted {
            self.collections.get_mut(id).ensure_field_index(&field)?;
        }

        Ok(())
    }

    pub fn collection(&self, name: &str) -> Result<&Collection, Error> {
        self.collections
            .by_name(name)
            .ok_or_else(|| Error::unknown_collection(name))
    }

    pub fn collection_id(&self, name: &str) -> Result<CollectionId, Error> {
        self.collections.require(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.names()
    }

    // ------------------------------------------------------------------
    // Add
    // ------------------------------------------------------------------

    /// Add records, resolving key conflicts by the collection's policy.
    pub fn add(
        &mut self,
        name: &str,
        records: Vec<Record>,
        opts: AddOptions,
    ) -> Result<Vec<Handle>, Error> {
        let id = self.collections.require(name)?;
        let result = self.add_records(id, records, opts);
        self.flush_events();

        result
    }

    pub fn add_one(&mut self, name: &str, record: Record) -> Result<Handle, Error> {
        let handles = self.add(name, vec![record], AddOptions::default())?;

        handles
            .into_iter()
            .next()
            .ok_or_else(|| Error::invariant(ErrorOrigin::Store, "add returned no handle"))
    }

    /// Add from JSON: an object or an array of objects.
    pub fn add_json(
        &mut self,
        name: &str,
        json: serde_json::Value,
        opts: AddOptions,
    ) -> Result<Vec<Handle>, Error> {
        let records = match json {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Record::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            object @ serde_json::Value::Object(_) => vec![Record::from_json(object)?],
            other => {
                return Err(Error::invalid_argument(
                    ErrorOrigin::Store,
                    format!(
                        "invalid record type: expected object or array of objects, got {other}"
                    ),
                ));
            }
        };

        self.add(name, records, opts)
    }

    fn add_records(
        &mut self,
        id: CollectionId,
        records: Vec<Record>,
        opts: AddOptions,
    ) -> Result<Vec<Handle>, Error> {
        let now = self.now();
        let policy = opts
            .on_conflict
            .unwrap_or(self.collections.get(id).config().on_conflict);

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let upsert = self.collections.get_mut(id).upsert(record, policy, now)?;
            let handle = upsert.handle();

            match upsert {
                Upsert::Inserted(handle) => {
                    self.after_insert(id, handle, now, MutationKind::Insert);
                }
                Upsert::Merged { handle, before } => {
                    self.record_mutation(id, MutationKind::Merge);
                    self.after_mutation(id, handle, &before, now)?;
                    let collection = self.collections.get_mut(id);
                    if opts.sync
                        && collection.config().reset_snapshot_on_sync
                        && let Some(record) = collection.record(handle).cloned()
                        && let Some(tracking) = collection.tracking_mut(handle)
                    {
                        tracking.reset_snapshot(&record);
                    }
                    collection.arm_expiry(handle, now);
                }
                Upsert::Replaced { old, removed, handle } => {
                    self.after_remove(id, old, &removed);
                    self.after_insert(id, handle, now, MutationKind::Replace);
                }
            }

            out.push(handle);
        }

        Ok(out)
    }

    fn after_insert(&mut self, id: CollectionId, handle: Handle, now: u64, kind: MutationKind) {
        self.record_mutation(id, kind);

        let stats = self.graph.on_upsert(&self.collections, id, handle, None);
        self.record_metric(MetricsEvent::Linked {
            collection: self.collections.get(id).name(),
            recomputed: stats.recomputed,
            stripped: stats.stripped,
        });

        self.queue_event(id, handle, EventKind::Add, None);
        self.collections.get_mut(id).arm_expiry(handle, now);
    }

    // Index, link, then diff a record whose fields already moved.
    fn after_mutation(
        &mut self,
        id: CollectionId,
        handle: Handle,
        before: &Record,
        now: u64,
    ) -> Result<bool, Error> {
        let collection = self.collections.get_mut(id);
        let delta = match collection.update_indexes(handle) {
            Ok(delta) => delta,
            Err(err) => {
                collection.restore(handle, before.clone());
                return Err(err);
            }
        };
        self.record_metric(MetricsEvent::IndexDelta {
            collection: self.collections.get(id).name(),
            inserts: delta.inserts,
            removes: delta.removes,
        });

        let stats = self.graph.on_upsert(&self.collections, id, handle, Some(before));
        self.record_metric(MetricsEvent::Linked {
            collection: self.collections.get(id).name(),
            recomputed: stats.recomputed,
            stripped: stats.stripped,
        });

        let Some(observed) = self.collections.get_mut(id).observe(handle, now)? else {
            return Ok(false);
        };
        self.record_metric(MetricsEvent::ChangeDetected {
            collection: self.collections.get(id).name(),
        });

        let fields: Vec<String> = observed.changes.fields().map(str::to_string).collect();
        self.queue_event(id, handle, EventKind::Change, Some(observed.changes.clone()));
        for field in fields {
            self.queue_event(
                id,
                handle,
                EventKind::ChangeField(field),
                Some(observed.changes.clone()),
            );
        }

        Ok(true)
    }

    fn after_remove(&mut self, id: CollectionId, handle: Handle, removed: &Removed) {
        let stripped = self.graph.on_remove(&self.collections, id, handle);
        self.record_metric(MetricsEvent::Linked {
            collection: self.collections.get(id).name(),
            recomputed: 0,
            stripped,
        });
        self.queue_event(id, handle, EventKind::Remove, None);

        debug!(
            collection = %self.collections.get(id).name(),
            %handle,
            key = %removed.record.value(self.collections.get(id).id_attribute()),
            "record removed"
        );
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str, key: impl Into<Value>) -> Result<Option<&Record>, Error> {
        let collection = self.collection(name)?;

        Ok(collection
            .get(&key.into())
            .and_then(|handle| collection.record(handle)))
    }

    pub fn get_handle(&self, name: &str, key: impl Into<Value>) -> Result<Option<Handle>, Error> {
        Ok(self.collection(name)?.get(&key.into()))
    }

    /// Live record for `handle`; fails once the record left the collection.
    pub fn record(&self, name: &str, handle: Handle) -> Result<&Record, Error> {
        self.collection(name)?
            .record(handle)
            .ok_or_else(|| Error::stale_handle(name))
    }

    /// Resolve many handles at once, in order.
    pub fn records(&self, name: &str, handles: &[Handle]) -> Result<Vec<&Record>, Error> {
        let collection = self.collection(name)?;

        handles
            .iter()
            .map(|h| collection.record(*h).ok_or_else(|| Error::stale_handle(name)))
            .collect()
    }

    pub fn get_all(
        &self,
        name: &str,
        lookups: &[Value],
        index: Option<&str>,
    ) -> Result<Vec<Handle>, Error> {
        self.collection(name)?.get_all(lookups, index)
    }

    pub fn between(
        &self,
        name: &str,
        left: &[Value],
        right: &[Value],
        index: Option<&str>,
        opts: RangeOptions,
    ) -> Result<Vec<Handle>, Error> {
        self.collection(name)?.between(left, right, index, opts)
    }

    pub fn filter(&self, name: &str, query: &Query) -> Result<Vec<Handle>, Error> {
        let collection = self.collection(name)?;
        let out = collection.filter(query)?;

        self.record_metric(MetricsEvent::Query {
            collection: name,
            rows_scanned: collection.len() as u64,
            rows_returned: out.len() as u64,
        });

        Ok(out)
    }

    /// `filter` with parameters in their JSON form.
    pub fn filter_json(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<Vec<Handle>, Error> {
        let query = Query::from_json(params)?;

        self.filter(name, &query)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Merge `patch` into a tracked record and run change detection.
    ///
    /// Returns whether any non-ignored field changed.
    pub fn update(&mut self, name: &str, handle: Handle, patch: Record) -> Result<bool, Error> {
        let id = self.collections.require(name)?;
        let result = self.apply_patch(id, handle, &patch);
        self.flush_events();

        result
    }

    pub(crate) fn apply_patch(
        &mut self,
        id: CollectionId,
        handle: Handle,
        patch: &Record,
    ) -> Result<bool, Error> {
        let now = self.now();
        let collection = self.collections.get_mut(id);
        let Some(record) = collection.record_mut(handle) else {
            return Err(Error::stale_handle(collection.name()));
        };
        let before = record.clone();
        record.merge(patch);

        self.after_mutation(id, handle, &before, now)
    }

    /// Direct field access for hosts that notify through `notify_changed`
    /// or rely on `digest`.
    pub fn record_mut(&mut self, name: &str, handle: Handle) -> Result<&mut Record, Error> {
        let id = self.collections.require(name)?;

        self.collections
            .get_mut(id)
            .record_mut(handle)
            .ok_or_else(|| Error::stale_handle(name))
    }

    /// Push-style mutation hook: process whatever changed on `handle` since
    /// it was last observed.
    pub fn notify_changed(&mut self, name: &str, handle: Handle) -> Result<bool, Error> {
        let id = self.collections.require(name)?;
        let result = self.process_dirty(id, handle);
        self.flush_events();

        result
    }

    /// Polling dirty-check over every tracked record. Returns the number of
    /// records with detected changes.
    pub fn digest(&mut self) -> Result<usize, Error> {
        let mut dirty = Vec::new();
        for (id, collection) in self.collections.iter() {
            for (handle, record) in collection.records() {
                let observed = collection.tracking(handle).map(|t| t.observed());
                if observed != Some(record) {
                    dirty.push((id, handle));
                }
            }
        }

        let mut changed = 0;
        let mut result = Ok(());
        for (id, handle) in dirty {
            match self.process_dirty(id, handle) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.flush_events();

        result.map(|()| changed)
    }

    fn process_dirty(&mut self, id: CollectionId, handle: Handle) -> Result<bool, Error> {
        let now = self.now();
        let collection = self.collections.get(id);
        let before = collection
            .tracking(handle)
            .map(|t| t.observed().clone())
            .ok_or_else(|| Error::stale_handle(collection.name()))?;

        self.after_mutation(id, handle, &before, now)
    }

    pub fn create_index(&mut self, name: &str, def: IndexDef) -> Result<(), Error> {
        let id = self.collections.require(name)?;

        self.collections.get_mut(id).create_index(def)
    }

    /// Re-file one record in one secondary index after an external mutation.
    pub fn update_index(&mut self, name: &str, handle: Handle, index: &str) -> Result<(), Error> {
        let id = self.collections.require(name)?;

        self.collections.get_mut(id).update_index(handle, index).map(|_| ())
    }

    /// Re-file one record in every index after an external mutation.
    pub fn update_indexes(&mut self, name: &str, handle: Handle) -> Result<(), Error> {
        let id = self.collections.require(name)?;

        self.collections.get_mut(id).update_indexes(handle).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------

    /// Remove by key; `None` when no record has that key.
    pub fn remove(&mut self, name: &str, key: impl Into<Value>) -> Result<Option<Record>, Error> {
        let id = self.collections.require(name)?;
        let Some(handle) = self.collections.get(id).get(&key.into()) else {
            return Ok(None);
        };
        let removed = self.remove_in(id, handle);
        self.flush_events();

        Ok(removed)
    }

    pub fn remove_handle(&mut self, name: &str, handle: Handle) -> Result<Record, Error> {
        let id = self.collections.require(name)?;
        let removed = self.remove_in(id, handle);
        self.flush_events();

        removed.ok_or_else(|| Error::stale_handle(name))
    }

    /// Remove every record matching `query` (all records for an empty query).
    pub fn remove_all(&mut self, name: &str, query: &Query) -> Result<Vec<Record>, Error> {
        let id = self.collections.require(name)?;
        let handles = self.collections.get(id).filter(query)?;

        let removed = handles
            .into_iter()
            .filter_map(|handle| self.remove_in(id, handle))
            .collect();
        self.collections.get_mut(id).clear_completed_queries();
        self.flush_events();

        Ok(removed)
    }

    /// Remove the records with the given keys; missing keys are skipped.
    pub fn remove_keys(&mut self, name: &str, keys: &[Value]) -> Result<Vec<Record>, Error> {
        let id = self.collections.require(name)?;

        let mut removed = Vec::new();
        for key in keys {
            if let Some(handle) = self.collections.get(id).get(key)
                && let Some(record) = self.remove_in(id, handle)
            {
                removed.push(record);
            }
        }
        self.flush_events();

        Ok(removed)
    }

    fn remove_in(&mut self, id: CollectionId, handle: Handle) -> Option<Record> {
        let removed = self.collections.get_mut(id).remove(handle)?;
        self.after_remove(id, handle, &removed);
        self.record_mutation(id, MutationKind::Remove);

        Some(removed.record)
    }

    // ------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------

    /// Diff against the clean snapshot; `None` when nothing changed.
    pub fn changes(
        &self,
        name: &str,
        handle: Handle,
        opts: &ChangeOptions,
    ) -> Result<Option<ChangeSet>, Error> {
        let collection = self.collection(name)?;
        let record = collection
            .record(handle)
            .ok_or_else(|| Error::stale_handle(name))?;
        let tracking = collection
            .tracking(handle)
            .ok_or_else(|| Error::stale_handle(name))?;

        let changes = if opts.ignore.is_empty() {
            tracking.changes(record, collection.ignore_set())
        } else {
            let mut ignore: IgnoreSet = collection.ignore_set().clone();
            ignore.extend(&opts.ignore)?;
            tracking.changes(record, &ignore)
        };

        Ok((!changes.is_empty()).then_some(changes))
    }

    pub fn has_changes(&self, name: &str, handle: Handle) -> Result<bool, Error> {
        Ok(self
            .changes(name, handle, &ChangeOptions::default())?
            .is_some())
    }

    /// The clean snapshot the diff is taken against.
    pub fn previous(&self, name: &str, handle: Handle) -> Result<&Record, Error> {
        self.collection(name)?
            .tracking(handle)
            .map(|t| t.snapshot())
            .ok_or_else(|| Error::stale_handle(name))
    }

    /// Save acknowledgement: stamp `last_saved`, reset the snapshot unless the
    /// collection preserves it across saves, and re-arm expiry.
    pub fn commit(&mut self, name: &str, handle: Handle) -> Result<(), Error> {
        let id = self.collections.require(name)?;
        let now = self.now();

        // pick up unnotified mutations first so history stays complete
        let result = self.process_dirty(id, handle);
        self.flush_events();
        result?;

        let collection = self.collections.get_mut(id);
        let reset = collection.config().reset_snapshot_on_sync;
        let record = collection
            .record(handle)
            .cloned()
            .ok_or_else(|| Error::stale_handle(name))?;
        if let Some(tracking) = collection.tracking_mut(handle) {
            if reset {
                tracking.reset_snapshot(&record);
            }
            tracking.mark_saved(now);
        }
        collection.arm_expiry(handle, now);

        Ok(())
    }

    pub fn change_history(&self, name: &str, handle: Handle) -> Result<&[ChangeRecord], Error> {
        self.collection(name)?
            .tracking(handle)
            .map(|t| t.history())
            .ok_or_else(|| Error::stale_handle(name))
    }

    pub fn collection_history(&self, name: &str) -> Result<&[ChangeRecord], Error> {
        Ok(self.collection(name)?.history())
    }

    /// Last modification time of a record, or of the collection.
    pub fn last_modified(&self, name: &str, handle: Option<Handle>) -> Result<u64, Error> {
        let collection = self.collection(name)?;

        match handle {
            None => Ok(collection.last_modified()),
            Some(handle) => collection
                .tracking(handle)
                .map(|t| t.last_modified())
                .ok_or_else(|| Error::stale_handle(name)),
        }
    }

    pub fn last_saved(&self, name: &str, handle: Handle) -> Result<Option<u64>, Error> {
        self.collection(name)?
            .tracking(handle)
            .map(|t| t.last_saved())
            .ok_or_else(|| Error::stale_handle(name))
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    /// Sweep expired entries and apply the collection's disposition.
    pub fn reap(&mut self, name: &str) -> Result<ReapReport, Error> {
        let id = self.collections.require(name)?;
        let now = self.now();
        let action = self.collections.get(id).config().effective_reap_action();
        let expired = self.collections.get_mut(id).drain_expired(now);

        let mut report = ReapReport {
            expired: expired.iter().map(|e| e.handle).collect(),
            ..ReapReport::default()
        };

        match action {
            ReapAction::Inject => {
                for entry in expired {
                    self.collections.get_mut(id).restore_expiry(entry);
                }
            }
            ReapAction::Eject => {
                for entry in expired {
                    if let Some(record) = self.remove_in(id, entry.handle) {
                        report.ejected.push(record);
                    }
                }
                if !report.ejected.is_empty() {
                    self.collections.get_mut(id).clear_completed_queries();
                }
            }
            ReapAction::Refresh => {
                for entry in expired {
                    let collection = self.collections.get_mut(id);
                    if let Some(key) = collection
                        .record(entry.handle)
                        .and_then(|record| collection.key_of(record))
                    {
                        report.refresh.push(key);
                    }
                    collection.restore_expiry(entry);
                }
            }
            ReapAction::None => {}
        }
        self.flush_events();

        self.record_metric(MetricsEvent::Reap {
            collection: name,
            expired: report.expired.len() as u64,
            ejected: report.ejected.len() as u64,
        });
        if !report.is_empty() {
            debug!(
                collection = name,
                ?action,
                expired = report.expired.len(),
                "reap sweep"
            );
        }

        Ok(report)
    }

    pub fn is_expired(&self, name: &str, handle: Handle) -> Result<bool, Error> {
        Ok(self.collection(name)?.is_expired(handle, self.now()))
    }

    // ------------------------------------------------------------------
    // Query state
    // ------------------------------------------------------------------

    pub fn mark_completed(&mut self, name: &str, key: QueryKey) -> Result<(), Error> {
        let id = self.collections.require(name)?;
        let now = self.now();
        self.collections.get_mut(id).mark_completed(key, now);

        Ok(())
    }

    pub fn is_completed(&self, name: &str, key: &QueryKey) -> Result<bool, Error> {
        Ok(self.collection(name)?.completed_at(key).is_some())
    }

    pub fn clear_completed(&mut self, name: &str, key: &QueryKey) -> Result<(), Error> {
        let id = self.collections.require(name)?;
        self.collections.get_mut(id).clear_completed(key);

        Ok(())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn subscribe<F>(
        &mut self,
        scope: EventScope,
        kind: EventKind,
        listener: F,
    ) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);

        self.events.subscribe(scope, kind, listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn queue_event(
        &mut self,
        id: CollectionId,
        handle: Handle,
        kind: EventKind,
        changes: Option<ChangeSet>,
    ) {
        if !self.events.has_subscribers() {
            return;
        }
        self.events.queue(Event {
            kind,
            collection: self.collections.get(id).name().to_string(),
            handle,
            changes,
        });
    }

    fn flush_events(&mut self) {
        deliver(self.events.drain());
    }

    fn record_mutation(&self, id: CollectionId, kind: MutationKind) {
        self.record_metric(MetricsEvent::Mutation {
            collection: self.collections.get(id).name(),
            kind,
        });
    }
}
