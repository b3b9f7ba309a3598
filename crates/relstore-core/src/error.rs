use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured runtime error with a stable classification.
/// Every failure raised by the core is synchronous and local; adapter failures
/// are wrapped once and then cloned to every caller attached to a fetch.
///

#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Operation against a collection name that was never defined.
    pub fn unknown_collection(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownCollection,
            ErrorOrigin::Store,
            format!("unknown collection: '{name}'"),
        )
    }

    /// Defining a collection name twice.
    pub fn duplicate_collection(name: &str) -> Self {
        Self::new(
            ErrorKind::DuplicateCollection,
            ErrorOrigin::Store,
            format!("collection already defined: '{name}'"),
        )
    }

    pub fn invalid_argument(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, origin, message)
    }

    pub fn record_not_found(collection: &str, key: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::RecordNotFound,
            ErrorOrigin::Collection,
            format!("record not found: {collection}[{key}]"),
        )
    }

    /// Record handle that no longer resolves (removed or replaced).
    pub fn stale_handle(collection: &str) -> Self {
        Self::new(
            ErrorKind::RecordNotFound,
            ErrorOrigin::Collection,
            format!("record handle is no longer live in '{collection}'"),
        )
    }

    pub fn conflict(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, origin, message)
    }

    pub fn invariant(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, origin, message)
    }

    /// Wrap an adapter failure so it can travel through a shared fetch.
    pub fn adapter(err: AdapterError) -> Self {
        Self {
            kind: ErrorKind::Adapter,
            origin: ErrorOrigin::Adapter,
            message: err.to_string(),
            detail: Some(ErrorDetail::Adapter(err)),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::RecordNotFound)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.kind, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`Error`].
///

#[derive(Clone, Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Adapter(AdapterError),
}

///
/// AdapterError
///
/// Failure reported by an external fetch/persistence adapter.
/// Propagated unchanged to every caller attached to the same fetch.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("adapter error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
pub struct AdapterError {
    pub status: Option<u16>,
    pub message: String,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl From<AdapterError> for Error {
    fn from(err: AdapterError) -> Self {
        Self::adapter(err)
    }
}

///
/// ErrorKind
/// Error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    UnknownCollection,
    InvalidArgument,
    DuplicateCollection,
    RecordNotFound,
    ConflictPolicyInvalid,
    Conflict,
    InvariantViolation,
    Adapter,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UnknownCollection => "unknown_collection",
            Self::InvalidArgument => "invalid_argument",
            Self::DuplicateCollection => "duplicate_collection",
            Self::RecordNotFound => "record_not_found",
            Self::ConflictPolicyInvalid => "conflict_policy_invalid",
            Self::Conflict => "conflict",
            Self::InvariantViolation => "invariant_violation",
            Self::Adapter => "adapter",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Store,
    Collection,
    Index,
    Query,
    Relation,
    Change,
    Expiry,
    Config,
    Adapter,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Store => "store",
            Self::Collection => "collection",
            Self::Index => "index",
            Self::Query => "query",
            Self::Relation => "relation",
            Self::Change => "change",
            Self::Expiry => "expiry",
            Self::Config => "config",
            Self::Adapter => "adapter",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
