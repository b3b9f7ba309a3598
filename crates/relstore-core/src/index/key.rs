use crate::value::{Value, canonical_cmp};
use derive_more::{Deref, IntoIterator};
use serde::Serialize;
use std::{cmp::Ordering, fmt};

///
/// IndexKey
///
/// Ordered tuple of field values; single-field indexes use a one-element key.
/// Components compare left to right with the canonical comparator, so `Null`
/// sorts before any non-null value.
///

#[derive(Clone, Debug, Default, Deref, Eq, Hash, IntoIterator, PartialEq, Serialize)]
pub struct IndexKey(Vec<Value>);

impl IndexKey {
    #[must_use]
    pub const fn new(components: Vec<Value>) -> Self {
        Self(components)
    }

    #[must_use]
    pub fn single(value: Value) -> Self {
        Self(vec![value])
    }

    /// Compare only the leading `lookup.len()` components.
    ///
    /// A lookup longer than the key compares the extra components against
    /// `Null`, so over-long lookups never match a shorter key by accident.
    #[must_use]
    pub fn cmp_prefix(&self, lookup: &[Value]) -> Ordering {
        for (i, lookup_value) in lookup.iter().enumerate() {
            let own = self.0.get(i).unwrap_or(&Value::NULL);
            let cmp = canonical_cmp(own, lookup_value);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }

        Ordering::Equal
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (left, right) in self.0.iter().zip(other.0.iter()) {
            let cmp = canonical_cmp(left, right);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }

        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        Self::single(value)
    }
}

impl From<Vec<Value>> for IndexKey {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            many => write!(f, "{}", Value::List(many.to_vec())),
        }
    }
}
