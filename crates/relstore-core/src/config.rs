//! Per-collection configuration surface.
//!
//! Everything here is plain data and deserializable, so collection settings
//! can be loaded from JSON/TOML alongside the application's own config.
//! Behavioural hooks (computed properties, custom filters) live on
//! `CollectionDef` instead.

use crate::{
    error::{Error, ErrorKind, ErrorOrigin},
    relation::RelationDescriptor,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

/// Default record key field.
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Default interval between background reap passes, in milliseconds.
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 30_000;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid onConflict policy '{0}' (expected 'merge' or 'replace')")]
    ConflictPolicyInvalid(String),

    #[error("invalid reapAction '{0}' (expected 'inject', 'eject', 'refresh' or 'none')")]
    ReapActionInvalid(String),

    #[error("invalid ignored-field pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid relation on '{collection}.{field}': {reason}")]
    InvalidRelation {
        collection: String,
        field: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConflictPolicyInvalid(_) => ErrorKind::ConflictPolicyInvalid,
            Self::ReapActionInvalid(_)
            | Self::InvalidPattern { .. }
            | Self::InvalidRelation { .. } => ErrorKind::InvalidArgument,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(err.kind(), ErrorOrigin::Config, err.to_string())
    }
}

///
/// OnConflict
///
/// What `add` does when a record with the same key is already stored.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum OnConflict {
    /// Shallow-merge new fields into the tracked record (same identity).
    #[default]
    Merge,
    /// Substitute all fields; the stored record gets a new identity.
    Replace,
}

impl FromStr for OnConflict {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "replace" => Ok(Self::Replace),
            other => Err(ConfigError::ConflictPolicyInvalid(other.to_string())),
        }
    }
}

impl TryFrom<String> for OnConflict {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for OnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

///
/// ReapAction
///
/// Disposition applied to records whose max age has elapsed.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ReapAction {
    /// Keep the record; it stays marked as expired for cache lookups.
    Inject,
    /// Remove the record from its collection.
    Eject,
    /// Re-fetch the record through the adapter and re-add it.
    Refresh,
    /// Drop the expiry entry and do nothing else.
    None,
}

impl FromStr for ReapAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inject" => Ok(Self::Inject),
            "eject" => Ok(Self::Eject),
            "refresh" => Ok(Self::Refresh),
            "none" => Ok(Self::None),
            other => Err(ConfigError::ReapActionInvalid(other.to_string())),
        }
    }
}

impl TryFrom<String> for ReapAction {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

///
/// IgnoreRule
///
/// Field blacklist entry for change tracking: an exact name or a regex.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreRule {
    Field(String),
    Pattern(String),
}

///
/// IndexDef
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexDef {
    pub name: String,
    pub fields: Vec<String>,
}

impl IndexDef {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

///
/// CollectionConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionConfig {
    pub id_attribute: String,

    /// Maximum age of a record in milliseconds; `None` never expires.
    pub max_age: Option<u64>,

    /// Interval between background reap passes in milliseconds.
    pub reap_interval: u64,

    /// Explicit disposition; defaults to `inject` when a max age is set.
    pub reap_action: Option<ReapAction>,

    pub on_conflict: OnConflict,
    pub ignored_changes: Vec<IgnoreRule>,
    pub keep_change_history: bool,

    /// Reset the change snapshot on re-add and on commit.
    pub reset_snapshot_on_sync: bool,

    pub indexes: Vec<IndexDef>,
    pub relations: Vec<RelationDescriptor>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            max_age: None,
            reap_interval: DEFAULT_REAP_INTERVAL_MS,
            reap_action: None,
            on_conflict: OnConflict::default(),
            ignored_changes: Vec::new(),
            keep_change_history: false,
            reset_snapshot_on_sync: true,
            indexes: Vec::new(),
            relations: Vec::new(),
        }
    }
}

impl CollectionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from plain data. Policy strings are checked first so a bad
    /// `onConflict` surfaces as `ConflictPolicyInvalid`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        if let Some(policy) = value.get("onConflict").and_then(serde_json::Value::as_str) {
            policy.parse::<OnConflict>()?;
        }
        if let Some(action) = value.get("reapAction").and_then(serde_json::Value::as_str) {
            action.parse::<ReapAction>()?;
        }

        serde_json::from_value(value)
            .map_err(|err| Error::invalid_argument(ErrorOrigin::Config, err.to_string()))
    }

    #[must_use]
    pub fn with_id_attribute(mut self, field: impl Into<String>) -> Self {
        self.id_attribute = field.into();
        self
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age.as_millis() as u64);
        self
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval.as_millis() as u64;
        self
    }

    #[must_use]
    pub const fn with_reap_action(mut self, action: ReapAction) -> Self {
        self.reap_action = Some(action);
        self
    }

    #[must_use]
    pub const fn with_on_conflict(mut self, policy: OnConflict) -> Self {
        self.on_conflict = policy;
        self
    }

    #[must_use]
    pub fn with_ignored(mut self, rule: IgnoreRule) -> Self {
        self.ignored_changes.push(rule);
        self
    }

    #[must_use]
    pub const fn with_change_history(mut self, keep: bool) -> Self {
        self.keep_change_history = keep;
        self
    }

    #[must_use]
    pub const fn with_reset_snapshot_on_sync(mut self, reset: bool) -> Self {
        self.reset_snapshot_on_sync = reset;
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    /// Disposition actually applied by `reap`.
    #[must_use]
    pub const fn effective_reap_action(&self) -> ReapAction {
        match (self.reap_action, self.max_age) {
            (Some(action), _) => action,
            (None, Some(_)) => ReapAction::Inject,
            (None, None) => ReapAction::None,
        }
    }

    #[must_use]
    pub const fn reap_interval_duration(&self) -> Duration {
        Duration::from_millis(self.reap_interval)
    }
}

///
/// TESTS
///
