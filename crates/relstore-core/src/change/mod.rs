//! Change tracking: snapshot diffs, ignore rules, computed properties.
//!
//! A tracked record carries two copies of its fields. The *snapshot* is the
//! last clean state (inject or save) and drives `changes()`. The *observed*
//! copy is the state at the last mutation pass and is what a dirty-check
//! compares against to decide that something moved.

mod computed;
mod tracking;


use crate::{
    config::{ConfigError, IgnoreRule},
    record::Record,
    value::Value,
};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// re-exports
pub use computed::ComputedProperty;
pub use tracking::{ChangeRecord, Tracking, next_timestamp};

///
/// ChangeSet
///
/// `removed` holds only field names; a removed field has no value.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ChangeSet {
    pub added: BTreeMap<String, Value>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeMap<String, Value>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Every field name the diff touches.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.added
            .keys()
            .chain(self.removed.iter())
            .chain(self.changed.keys())
            .map(String::as_str)
    }

    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.added.contains_key(field)
            || self.removed.contains(field)
            || self.changed.contains_key(field)
    }
}

///
/// ChangeOptions
///
/// Extra ignore rules applied on top of the collection's own blacklist.
///

#[derive(Clone, Debug, Default)]
pub struct ChangeOptions {
    pub ignore: Vec<IgnoreRule>,
}

impl ChangeOptions {
    #[must_use]
    pub fn ignoring(mut self, rule: IgnoreRule) -> Self {
        self.ignore.push(rule);
        self
    }
}

///
/// IgnoreSet
///
/// Compiled field blacklist. Patterns match anywhere in the field name.
///

#[derive(Clone, Debug, Default)]
pub struct IgnoreSet {
    fields: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl IgnoreSet {
    pub fn compile(rules: &[IgnoreRule]) -> Result<Self, ConfigError> {
        let mut set = Self::default();
        set.extend(rules)?;

        Ok(set)
    }

    pub fn extend(&mut self, rules: &[IgnoreRule]) -> Result<(), ConfigError> {
        for rule in rules {
            match rule {
                IgnoreRule::Field(field) => {
                    self.fields.insert(field.clone());
                }
                IgnoreRule::Pattern(pattern) => {
                    let regex = Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: err.to_string(),
                    })?;
                    self.patterns.push(regex);
                }
            }
        }

        Ok(())
    }

    /// Add exact field names (computed properties are never diffed).
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn is_ignored(&self, field: &str) -> bool {
        self.fields.contains(field) || self.patterns.iter().any(|p| p.is_match(field))
    }
}

/// Field-level diff of `current` against `base`, skipping ignored fields.
#[must_use]
pub fn diff(base: &Record, current: &Record, ignore: &IgnoreSet) -> ChangeSet {
    let mut out = ChangeSet::default();

    for (field, value) in current {
        if ignore.is_ignored(field) {
            continue;
        }
        match base.get(field) {
            None => {
                out.added.insert(field.clone(), value.clone());
            }
            Some(prev) if prev != value => {
                out.changed.insert(field.clone(), value.clone());
            }
            Some(_) => {}
        }
    }

    for field in base.keys() {
        if !current.contains_key(field) && !ignore.is_ignored(field) {
            out.removed.insert(field.clone());
        }
    }

    out
}
