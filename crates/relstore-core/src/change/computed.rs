use crate::{change::ChangeSet, record::Record, value::Value};
use std::{fmt, sync::Arc};

type ComputeFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

///
/// ComputedProperty
///
/// A derived field declared as `(dependencies, pure function)`. With no
/// dependencies it is recomputed on every detected change.
///

#[derive(Clone)]
pub struct ComputedProperty {
    field: String,
    deps: Vec<String>,
    compute: ComputeFn,
}

impl ComputedProperty {
    pub fn new<I, S, F>(field: impl Into<String>, deps: I, compute: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self {
            field: field.into(),
            deps: deps.into_iter().map(Into::into).collect(),
            compute: Arc::new(compute),
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    #[must_use]
    pub fn affected_by(&self, changes: &ChangeSet) -> bool {
        self.deps.is_empty() || self.deps.iter().any(|dep| changes.touches(dep))
    }

    /// Write the computed value into `record`; returns true if it moved.
    pub fn apply(&self, record: &mut Record) -> bool {
        let value = (self.compute)(record);
        if record.get(&self.field) == Some(&value) {
            return false;
        }
        record.set(self.field.clone(), value);

        true
    }
}

impl fmt::Debug for ComputedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedProperty")
            .field("field", &self.field)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}
