use crate::{
    arena::Handle,
    collection::{Collection, CollectionId, CollectionSet},
    record::Record,
    relation::{Related, RelationDescriptor, RelationKey, RelationKind},
    value::{Value, canonical_cmp},
};
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};
use tracing::{debug, warn};

///
/// RecordRef
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct RecordRef {
    pub collection: CollectionId,
    pub handle: Handle,
}

///
/// LinkRef
///
/// One relation field on one owner record: `(owner, relation position)`.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct LinkRef {
    owner: RecordRef,
    relation: usize,
}

#[derive(Clone, Debug)]
struct Link {
    target: CollectionId,
    related: Related,
}

///
/// LinkStats
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct LinkStats {
    pub recomputed: u64,
    pub stripped: u64,
}

///
/// RelationGraph
///
/// Stored links for every eagerly-linked relation, and a reverse index from
/// each referenced record to the links that currently hold it.
///

#[derive(Debug, Default)]
pub(crate) struct RelationGraph {
    links: HashMap<LinkRef, Link>,
    reverse: HashMap<RecordRef, HashSet<LinkRef>>,
}

impl RelationGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stored value of an eagerly-linked relation field.
    pub(crate) fn get(
        &self,
        collection: CollectionId,
        handle: Handle,
        relation: usize,
    ) -> Option<&Related> {
        let key = LinkRef {
            owner: RecordRef { collection, handle },
            relation,
        };

        self.links.get(&key).map(|link| &link.related)
    }

    /// Bring every affected relation field up to date after `handle` in
    /// `collection` was inserted (`before == None`) or changed.
    ///
    /// Each affected link is recomputed at most once per call, so cyclic and
    /// self-referential relation graphs terminate.
    pub(crate) fn on_upsert(
        &mut self,
        set: &CollectionSet,
        collection: CollectionId,
        handle: Handle,
        before: Option<&Record>,
    ) -> LinkStats {
        let owner_coll = set.get(collection);
        let Some(after) = owner_coll.record(handle) else {
            return LinkStats::default();
        };

        let mut work = Worklist::default();

        // own relation fields
        for (i, desc) in owner_coll.relations().iter().enumerate() {
            if desc.link
                && (before.is_none() || owner_side_moved(owner_coll, desc, before, after))
            {
                work.push(LinkRef {
                    owner: RecordRef { collection, handle },
                    relation: i,
                });
            }
        }

        // relations declared elsewhere that point at this collection
        let this = RecordRef { collection, handle };
        for (other_id, other) in set.iter() {
            for (i, desc) in other.relations().iter().enumerate() {
                if !desc.link || set.id_of(&desc.target) != Some(collection) {
                    continue;
                }
                discover_inverse(set, &mut work, (other_id, other), i, desc, this, before, after);
            }
        }

        let mut stats = LinkStats::default();
        for link in work.order {
            self.recompute(set, link);
            stats.recomputed += 1;
        }
        for (link, op) in work.incremental {
            self.apply_incremental(set, link, op, handle);
            stats.recomputed += 1;
        }

        debug!(
            collection = %owner_coll.name(),
            %handle,
            recomputed = stats.recomputed,
            "relations linked"
        );

        stats
    }

    /// Drop everything `handle` owned, and strip it by identity from every
    /// link that pointed at it. Returns the number of links stripped.
    pub(crate) fn on_remove(
        &mut self,
        set: &CollectionSet,
        collection: CollectionId,
        handle: Handle,
    ) -> u64 {
        let relations = set.get(collection).relations().len();
        for relation in 0..relations {
            let key = LinkRef {
                owner: RecordRef { collection, handle },
                relation,
            };
            if let Some(link) = self.links.remove(&key) {
                self.unindex(key, &link);
            }
        }

        let this = RecordRef { collection, handle };
        let Some(holders) = self.reverse.remove(&this) else {
            return 0;
        };

        let mut stripped = 0;
        for holder in holders {
            let Some(link) = self.links.get_mut(&holder) else {
                continue;
            };
            match &mut link.related {
                Related::One(slot) if *slot == Some(handle) => {
                    *slot = None;
                    stripped += 1;
                }
                Related::Many(handles) => {
                    let len = handles.len();
                    handles.retain(|h| *h != handle);
                    if handles.len() != len {
                        stripped += 1;
                    }
                }
                Related::One(_) => {}
            }
        }

        debug!(
            collection = %set.get(collection).name(),
            %handle,
            stripped,
            "relations unlinked"
        );

        stripped
    }

    /// Resolve a relation from current field values without storing it.
    pub(crate) fn resolve(
        set: &CollectionSet,
        collection: CollectionId,
        handle: Handle,
        relation: usize,
    ) -> Option<(CollectionId, Related)> {
        let owner = set.get(collection);
        let desc = owner.relations().get(relation)?;
        let record = owner.record(handle)?;

        let Some(target_id) = set.id_of(&desc.target) else {
            warn!(
                collection = %owner.name(),
                target = %desc.target,
                "relation target collection is not defined"
            );
            return None;
        };
        let target = set.get(target_id);

        let handles: Vec<Handle> = match (&desc.kind, &desc.key) {
            (RelationKind::BelongsTo, RelationKey::ForeignKey(fk)) => {
                target.find_by(target.id_attribute(), record.value(fk))
            }
            (_, RelationKey::ForeignKey(fk)) => match owner.key_of(record) {
                Some(key) => target.find_by(fk, &key),
                None => Vec::new(),
            },
            (_, RelationKey::LocalKeys(local_keys)) => {
                let mut seen = HashSet::new();
                record
                    .value(local_keys)
                    .members()
                    .iter()
                    .filter_map(|key| target.get(key))
                    .filter(|h| seen.insert(*h))
                    .collect()
            }
            (_, RelationKey::ForeignKeys(foreign_keys)) => match owner.key_of(record) {
                Some(key) => target
                    .records()
                    .filter(|(_, r)| contains_key(r.value(foreign_keys).members(), &key))
                    .map(|(h, _)| h)
                    .collect(),
                None => Vec::new(),
            },
        };

        let related = if desc.kind.is_many() {
            Related::Many(handles)
        } else {
            Related::One(handles.first().copied())
        };

        Some((target_id, related))
    }

    fn recompute(&mut self, set: &CollectionSet, key: LinkRef) {
        match Self::resolve(set, key.owner.collection, key.owner.handle, key.relation) {
            Some((target, related)) => self.store(key, Link { target, related }),
            None => {
                if let Some(link) = self.links.remove(&key) {
                    self.unindex(key, &link);
                }
            }
        }
    }

    fn apply_incremental(
        &mut self,
        set: &CollectionSet,
        key: LinkRef,
        op: Incremental,
        child: Handle,
    ) {
        let Some(link) = self.links.get_mut(&key) else {
            // never linked (owner defined before its target): build it whole
            self.recompute(set, key);
            return;
        };
        let Related::Many(handles) = &mut link.related else {
            self.recompute(set, key);
            return;
        };

        let target = RecordRef {
            collection: link.target,
            handle: child,
        };
        match op {
            Incremental::Detach => {
                handles.retain(|h| *h != child);
                if let Some(holders) = self.reverse.get_mut(&target) {
                    holders.remove(&key);
                }
            }
            Incremental::Attach => {
                if !handles.contains(&child) {
                    handles.push(child);
                }
                self.reverse.entry(target).or_default().insert(key);
            }
        }
    }

    fn store(&mut self, key: LinkRef, link: Link) {
        if let Some(previous) = self.links.remove(&key) {
            self.unindex(key, &previous);
        }
        for handle in link.related.handles() {
            self.reverse
                .entry(RecordRef {
                    collection: link.target,
                    handle: *handle,
                })
                .or_default()
                .insert(key);
        }
        self.links.insert(key, link);
    }

    fn unindex(&mut self, key: LinkRef, link: &Link) {
        for handle in link.related.handles() {
            let target = RecordRef {
                collection: link.target,
                handle: *handle,
            };
            if let Some(holders) = self.reverse.get_mut(&target) {
                holders.remove(&key);
                if holders.is_empty() {
                    self.reverse.remove(&target);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (key, link) in &self.links {
            for handle in link.related.handles() {
                let target = RecordRef {
                    collection: link.target,
                    handle: *handle,
                };
                assert!(
                    self.reverse.get(&target).is_some_and(|h| h.contains(key)),
                    "missing reverse entry for {handle}"
                );
            }
        }
        for (target, holders) in &self.reverse {
            for holder in holders {
                let link = &self.links[holder];
                assert!(link.related.handles().contains(&target.handle));
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Incremental {
    Detach,
    Attach,
}

// Deduplicating work queue: a link scheduled for full recompute is never also
// patched incrementally.
#[derive(Default)]
struct Worklist {
    seen: HashSet<LinkRef>,
    order: Vec<LinkRef>,
    incremental: Vec<(LinkRef, Incremental)>,
}

impl Worklist {
    fn push(&mut self, key: LinkRef) {
        if self.seen.insert(key) {
            self.order.push(key);
        }
        self.incremental.retain(|(k, _)| *k != key);
    }

    fn incremental(&mut self, key: LinkRef, op: Incremental) {
        if self.seen.contains(&key) {
            return;
        }
        // detach + attach on one parent cancels to a no-op
        if let Some(at) = self.incremental.iter().position(|(k, _)| *k == key) {
            self.incremental.remove(at);
            return;
        }
        self.incremental.push((key, op));
    }
}

// Schedule links on `other` that hold or list `this`.
#[allow(clippy::too_many_arguments)]
fn discover_inverse(
    set: &CollectionSet,
    work: &mut Worklist,
    (other_id, other): (CollectionId, &Collection),
    relation: usize,
    desc: &RelationDescriptor,
    this: RecordRef,
    before: Option<&Record>,
    after: &Record,
) {
    let this_coll = set.get(this.collection);
    let id_attr = this_coll.id_attribute();
    let key_moved = before.is_none_or(|b| b.value(id_attr) != after.value(id_attr));
    let owner = |handle| LinkRef {
        owner: RecordRef {
            collection: other_id,
            handle,
        },
        relation,
    };

    match (&desc.kind, &desc.key) {
        // owners hold our key in a scalar field
        (RelationKind::BelongsTo, RelationKey::ForeignKey(fk)) => {
            if !key_moved {
                return;
            }
            for key in endpoints(before.map(|b| b.value(id_attr)), after.value(id_attr)) {
                for handle in other.find_by(fk, key) {
                    work.push(owner(handle));
                }
            }
        }

        // we hold the owner's key; move between the two parents only
        (RelationKind::HasMany, RelationKey::ForeignKey(fk)) => {
            let old = before.map(|b| b.value(fk));
            let new = after.value(fk);
            if before.is_some() && old == Some(new) {
                return;
            }
            if let Some(old) = old {
                for handle in other.find_by(other.id_attribute(), old) {
                    work.incremental(owner(handle), Incremental::Detach);
                }
            }
            for handle in other.find_by(other.id_attribute(), new) {
                work.incremental(owner(handle), Incremental::Attach);
            }
        }

        (RelationKind::HasOne, RelationKey::ForeignKey(fk)) => {
            let old = before.map(|b| b.value(fk));
            let new = after.value(fk);
            if before.is_some() && old == Some(new) {
                return;
            }
            for key in endpoints(old, new) {
                for handle in other.find_by(other.id_attribute(), key) {
                    work.push(owner(handle));
                }
            }
        }

        // owners list our key
        (_, RelationKey::LocalKeys(local_keys)) => {
            if !key_moved {
                return;
            }
            let keys = endpoints(before.map(|b| b.value(id_attr)), after.value(id_attr));
            for (handle, record) in other.records() {
                let listed = record.value(local_keys).members();
                if keys.iter().any(|k| contains_key(listed, k)) {
                    work.push(owner(handle));
                }
            }
        }

        // we list the owners' keys
        (_, RelationKey::ForeignKeys(foreign_keys)) => {
            let old = before.map(|b| b.value(foreign_keys));
            let new = after.value(foreign_keys);
            if before.is_some() && old == Some(new) {
                return;
            }
            let keys = old
                .map(Value::members)
                .unwrap_or_default()
                .iter()
                .chain(new.members());
            for key in keys {
                for handle in other.find_by(other.id_attribute(), key) {
                    work.push(owner(handle));
                }
            }
        }
    }
}

fn owner_side_moved(
    owner: &Collection,
    desc: &RelationDescriptor,
    before: Option<&Record>,
    after: &Record,
) -> bool {
    let Some(before) = before else {
        return true;
    };
    let field = match &desc.key {
        RelationKey::ForeignKey(fk) if desc.kind == RelationKind::BelongsTo => fk.as_str(),
        RelationKey::LocalKeys(local_keys) => local_keys.as_str(),
        RelationKey::ForeignKey(_) | RelationKey::ForeignKeys(_) => owner.id_attribute(),
    };

    before.value(field) != after.value(field)
}

// Old and new values of a join field, nulls and duplicates dropped.
fn endpoints<'a>(old: Option<&'a Value>, new: &'a Value) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(2);
    if let Some(old) = old
        && !old.is_null()
    {
        out.push(old);
    }
    if !new.is_null() && out.first().is_none_or(|o| canonical_cmp(o, new) != Ordering::Equal) {
        out.push(new);
    }

    out
}

fn contains_key(list: &[Value], key: &Value) -> bool {
    list.iter()
        .any(|item| canonical_cmp(item, key) == Ordering::Equal)
}
