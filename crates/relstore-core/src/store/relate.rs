use crate::{
    arena::Handle,
    collection::CollectionId,
    error::{Error, ErrorOrigin},
    record::Record,
    relation::{Related, RelationDescriptor, RelationGraph, RelationKey, RelationKind},
    store::Store,
    value::{Value, canonical_cmp},
};
use std::cmp::Ordering;

impl Store {
    /// Current value of a relation field.
    ///
    /// Eagerly-linked relations read the stored link; the rest are resolved
    /// from the join fields on every call.
    pub fn related(&self, name: &str, handle: Handle, field: &str) -> Result<Related, Error> {
        let (id, relation, desc) = self.relation_of(name, field)?;
        if !self.collections.get(id).contains(handle) {
            return Err(Error::stale_handle(name));
        }

        let stored = if desc.link {
            self.graph.get(id, handle, relation).cloned()
        } else {
            RelationGraph::resolve(&self.collections, id, handle, relation)
                .map(|(_, related)| related)
        };

        Ok(stored.unwrap_or_else(|| Related::empty(desc.kind)))
    }

    /// Related records, in link order.
    pub fn related_records(
        &self,
        name: &str,
        handle: Handle,
        field: &str,
    ) -> Result<Vec<&Record>, Error> {
        let related = self.related(name, handle, field)?;
        let (_, _, desc) = self.relation_of(name, field)?;
        let target = self.collection(&desc.target)?;

        Ok(related
            .handles()
            .iter()
            .filter_map(|h| target.record(*h))
            .collect())
    }

    /// Assign a relation by rewriting the join fields on whichever side
    /// holds them. Every touched record goes through the normal mutation
    /// path, so indexes, links and change events follow.
    pub fn set_related(
        &mut self,
        name: &str,
        handle: Handle,
        field: &str,
        targets: &[Handle],
    ) -> Result<(), Error> {
        let (id, _, desc) = self.relation_of(name, field)?;
        let desc = desc.clone();
        let target_id = self.collections.require(&desc.target)?;
        if !desc.kind.is_many() && targets.len() > 1 {
            return Err(Error::invalid_argument(
                ErrorOrigin::Relation,
                format!("relation '{field}' on '{name}' holds at most one record"),
            ));
        }

        let result = self.assign(id, handle, target_id, &desc, targets);
        self.flush_events();

        result
    }

    fn assign(
        &mut self,
        id: CollectionId,
        handle: Handle,
        target_id: CollectionId,
        desc: &RelationDescriptor,
        targets: &[Handle],
    ) -> Result<(), Error> {
        let owner = self.collections.get(id);
        let owner_key = owner
            .record(handle)
            .ok_or_else(|| Error::stale_handle(owner.name()))
            .map(|record| owner.key_of(record).unwrap_or(Value::Null))?;
        let target_keys = self.keys_of(target_id, targets)?;

        match (&desc.kind, &desc.key) {
            (RelationKind::BelongsTo, RelationKey::ForeignKey(fk)) => {
                let key = target_keys.into_iter().next().unwrap_or(Value::Null);
                self.apply_patch(id, handle, &patch(fk, key))?;
            }

            // the targets hold our key
            (_, RelationKey::ForeignKey(fk)) => {
                if owner_key.is_null() {
                    return Err(unkeyed(owner.name()));
                }
                let current = self.related_handles(id, handle, desc)?;
                for old in current.iter().filter(|h| !targets.contains(h)) {
                    self.apply_patch(target_id, *old, &patch(fk, Value::Null))?;
                }
                for target in targets {
                    self.apply_patch(target_id, *target, &patch(fk, owner_key.clone()))?;
                }
            }

            (_, RelationKey::LocalKeys(local_keys)) => {
                self.apply_patch(id, handle, &patch(local_keys, Value::List(target_keys)))?;
            }

            // the targets list our key
            (_, RelationKey::ForeignKeys(foreign_keys)) => {
                if owner_key.is_null() {
                    return Err(unkeyed(owner.name()));
                }
                let current = self.related_handles(id, handle, desc)?;
                let target_coll = self.collections.get(target_id);

                let mut patches = Vec::new();
                for old in current.iter().filter(|h| !targets.contains(h)) {
                    if let Some(record) = target_coll.record(*old) {
                        let list: Vec<Value> = record
                            .value(foreign_keys)
                            .members()
                            .iter()
                            .filter(|k| !same_key(k, &owner_key))
                            .cloned()
                            .collect();
                        patches.push((*old, patch(foreign_keys, Value::List(list))));
                    }
                }
                for target in targets {
                    if let Some(record) = target_coll.record(*target) {
                        let mut list = record.value(foreign_keys).members().to_vec();
                        if !list.iter().any(|k| same_key(k, &owner_key)) {
                            list.push(owner_key.clone());
                            patches.push((*target, patch(foreign_keys, Value::List(list))));
                        }
                    }
                }

                for (target, patch) in patches {
                    self.apply_patch(target_id, target, &patch)?;
                }
            }
        }

        Ok(())
    }

    fn relation_of(
        &self,
        name: &str,
        field: &str,
    ) -> Result<(CollectionId, usize, &RelationDescriptor), Error> {
        let id = self.collections.require(name)?;
        let collection = self.collections.get(id);
        let relation = collection.relation_index(field).ok_or_else(|| {
            Error::invalid_argument(
                ErrorOrigin::Relation,
                format!("'{name}' has no relation field '{field}'"),
            )
        })?;

        Ok((id, relation, &collection.relations()[relation]))
    }

    fn related_handles(
        &self,
        id: CollectionId,
        handle: Handle,
        desc: &RelationDescriptor,
    ) -> Result<Vec<Handle>, Error> {
        let name = self.collections.get(id).name();
        let related = self.related(name, handle, &desc.local_field)?;

        Ok(related.handles().to_vec())
    }

    fn keys_of(&self, id: CollectionId, handles: &[Handle]) -> Result<Vec<Value>, Error> {
        let collection = self.collections.get(id);

        handles
            .iter()
            .map(|handle| {
                let record = collection
                    .record(*handle)
                    .ok_or_else(|| Error::stale_handle(collection.name()))?;
                collection
                    .key_of(record)
                    .ok_or_else(|| unkeyed(collection.name()))
            })
            .collect()
    }
}

fn patch(field: &str, value: Value) -> Record {
    std::iter::once((field.to_string(), value)).collect()
}

fn same_key(left: &Value, right: &Value) -> bool {
    canonical_cmp(left, right) == Ordering::Equal
}

fn unkeyed(collection: &str) -> Error {
    Error::invalid_argument(
        ErrorOrigin::Relation,
        format!("record in '{collection}' has no key to relate by"),
    )
}
