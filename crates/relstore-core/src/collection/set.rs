use crate::{collection::Collection, error::Error};
use std::{collections::HashMap, fmt};

///
/// CollectionId
///
/// Dense id of a collection within one store; stable for the store's life.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CollectionId(usize);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

///
/// CollectionSet
///

#[derive(Default)]
pub struct CollectionSet {
    list: Vec<Collection>,
    by_name: HashMap<String, CollectionId>,
}

impl CollectionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: Collection) -> Result<CollectionId, Error> {
        if self.by_name.contains_key(collection.name()) {
            return Err(Error::duplicate_collection(collection.name()));
        }

        let id = CollectionId(self.list.len());
        self.by_name.insert(collection.name().to_string(), id);
        self.list.push(collection);

        Ok(id)
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<CollectionId> {
        self.by_name.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<CollectionId, Error> {
        self.id_of(name)
            .ok_or_else(|| Error::unknown_collection(name))
    }

    #[must_use]
    pub fn get(&self, id: CollectionId) -> &Collection {
        &self.list[id.0]
    }

    pub fn get_mut(&mut self, id: CollectionId) -> &mut Collection {
        &mut self.list[id.0]
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Collection> {
        self.id_of(name).map(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CollectionId, &Collection)> {
        self.list
            .iter()
            .enumerate()
            .map(|(i, collection)| (CollectionId(i), collection))
    }

    pub fn ids(&self) -> impl Iterator<Item = CollectionId> + use<> {
        (0..self.list.len()).map(CollectionId)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.list.iter().map(Collection::name)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
