use crate::{
    error::{Error, ErrorOrigin},
    value::Value,
};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// Record
///
/// One stored entity: an ordered bag of named fields.
///
/// Mutation is explicit through `set`/`remove`/`merge`; `Record` does not
/// expose `DerefMut` so every write goes through a method the store can reason
/// about. Relation fields are never stored here; they live in the linker.
///

#[derive(Clone, Debug, Default, Deref, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a record from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
            other => Err(Error::invalid_argument(
                ErrorOrigin::Collection,
                format!("invalid record type: expected object, got {other}"),
            )),
        }
    }

    /// Read a field; absent fields read as `Null`.
    #[must_use]
    pub fn value(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&Value::NULL)
    }

    /// Read a dot-delimited nested field path (`author.name`).
    #[must_use]
    pub fn value_at_path(&self, path: &str) -> &Value {
        let mut parts = path.split('.');
        let Some(head) = parts.next() else {
            return &Value::NULL;
        };

        let mut current = self.value(head);
        for part in parts {
            current = match current {
                Value::Map(map) => map.get(part).unwrap_or(&Value::NULL),
                _ => return &Value::NULL,
            };
        }

        current
    }

    /// Set one field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Shallow-merge: overwrite only the fields present in `other`.
    pub fn merge(&mut self, other: &Self) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Replace every field with the fields of `other`.
    pub fn replace(&mut self, other: Self) {
        self.0 = other.0;
    }

    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        Value::Map(self.0).into()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_fields_read_as_null() {
        let record = Record::from_json(json!({ "id": 1 })).unwrap();

        assert_eq!(record.value("id"), &Value::Int(1));
        assert_eq!(record.value("missing"), &Value::Null);
        assert!(!record.contains_key("missing"));
    }

    #[test]
    fn nested_paths_resolve_through_maps() {
        let record =
            Record::from_json(json!({ "author": { "name": "ann", "meta": { "age": 3 } } }))
                .unwrap();

        assert_eq!(record.value_at_path("author.name"), &Value::from("ann"));
        assert_eq!(record.value_at_path("author.meta.age"), &Value::Int(3));
        assert_eq!(record.value_at_path("author.name.first"), &Value::Null);
        assert_eq!(record.value_at_path("nope.x"), &Value::Null);
    }

    #[test]
    fn merge_only_overwrites_supplied_fields() {
        let mut record = Record::from_json(json!({ "id": 1, "a": 1, "b": 2 })).unwrap();
        record.merge(&Record::from_json(json!({ "id": 1, "b": 3 })).unwrap());

        assert_eq!(
            record,
            Record::from_json(json!({ "id": 1, "a": 1, "b": 3 })).unwrap()
        );
    }

    #[test]
    fn non_object_json_is_rejected() {
        let err = Record::from_json(json!([1, 2])).unwrap_err();

        assert_eq!(err.kind, crate::error::ErrorKind::InvalidArgument);
    }
}
