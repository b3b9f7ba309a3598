//! Relation metadata and the cross-collection link graph.
//!
//! Descriptors are plain configuration. The graph holds the derived relation
//! fields as handle lists, never as owned records, and keeps a reverse index
//! from each referenced record to the links that point at it.

mod graph;


use crate::{arena::Handle, config::ConfigError};
use serde::{Deserialize, Serialize};

// re-exports
pub(crate) use graph::RelationGraph;

///
/// RelationKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    BelongsTo,
    HasMany,
    HasOne,
}

impl RelationKind {
    #[must_use]
    pub const fn is_many(self) -> bool {
        matches!(self, Self::HasMany)
    }
}

///
/// RelationKey
///
/// Which field joins the two sides.
///
/// * `ForeignKey` on `belongsTo` names the owner field holding the target key;
///   on `hasMany`/`hasOne` it names the target field holding the owner key.
/// * `LocalKeys` names an owner field holding a list of target keys.
/// * `ForeignKeys` names a target field holding a list of owner keys.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKey {
    ForeignKey(String),
    LocalKeys(String),
    ForeignKeys(String),
}

impl RelationKey {
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::ForeignKey(field) | Self::LocalKeys(field) | Self::ForeignKeys(field) => field,
        }
    }
}

///
/// RelationDescriptor
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDescriptor {
    #[serde(rename = "type")]
    pub kind: RelationKind,

    /// Name of the related collection.
    pub target: String,

    /// Name under which the related record(s) are exposed.
    pub local_field: String,

    #[serde(flatten)]
    pub key: RelationKey,

    /// Maintain the link eagerly; when false it is resolved on every read.
    #[serde(default = "default_link")]
    pub link: bool,
}

const fn default_link() -> bool {
    true
}

impl RelationDescriptor {
    pub fn belongs_to(
        target: impl Into<String>,
        local_field: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::BelongsTo,
            target,
            local_field,
            RelationKey::ForeignKey(foreign_key.into()),
        )
    }

    pub fn has_many(
        target: impl Into<String>,
        local_field: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::HasMany,
            target,
            local_field,
            RelationKey::ForeignKey(foreign_key.into()),
        )
    }

    pub fn has_one(
        target: impl Into<String>,
        local_field: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::HasOne,
            target,
            local_field,
            RelationKey::ForeignKey(foreign_key.into()),
        )
    }

    pub fn has_many_local_keys(
        target: impl Into<String>,
        local_field: impl Into<String>,
        local_keys: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::HasMany,
            target,
            local_field,
            RelationKey::LocalKeys(local_keys.into()),
        )
    }

    pub fn has_many_foreign_keys(
        target: impl Into<String>,
        local_field: impl Into<String>,
        foreign_keys: impl Into<String>,
    ) -> Self {
        Self::new(
            RelationKind::HasMany,
            target,
            local_field,
            RelationKey::ForeignKeys(foreign_keys.into()),
        )
    }

    fn new(
        kind: RelationKind,
        target: impl Into<String>,
        local_field: impl Into<String>,
        key: RelationKey,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            local_field: local_field.into(),
            key,
            link: true,
        }
    }

    #[must_use]
    pub const fn with_link(mut self, link: bool) -> Self {
        self.link = link;
        self
    }

    pub(crate) fn validate(&self, collection: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRelation {
            collection: collection.to_string(),
            field: self.local_field.clone(),
            reason: reason.to_string(),
        };

        if self.local_field.is_empty() {
            return Err(invalid("localField is empty"));
        }
        if self.target.is_empty() {
            return Err(invalid("target collection is empty"));
        }
        if self.key.field().is_empty() {
            return Err(invalid("key field is empty"));
        }
        if self.kind == RelationKind::BelongsTo && !matches!(self.key, RelationKey::ForeignKey(_)) {
            return Err(invalid("belongsTo requires a foreignKey"));
        }

        Ok(())
    }
}

///
/// Related
///
/// Current value of a relation field: handles into the target collection.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Related {
    One(Option<Handle>),
    Many(Vec<Handle>),
}

impl Related {
    pub(crate) const fn empty(kind: RelationKind) -> Self {
        if kind.is_many() {
            Self::Many(Vec::new())
        } else {
            Self::One(None)
        }
    }

    #[must_use]
    pub fn handles(&self) -> &[Handle] {
        match self {
            Self::One(Some(handle)) => std::slice::from_ref(handle),
            Self::One(None) => &[],
            Self::Many(handles) => handles,
        }
    }

    #[must_use]
    pub const fn one(&self) -> Option<Handle> {
        match self {
            Self::One(handle) => *handle,
            Self::Many(_) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles().is_empty()
    }
}
