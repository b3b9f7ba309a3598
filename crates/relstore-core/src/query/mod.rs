//! Query engine: a pure `records -> records'` pipeline.
//!
//! Stages run in a fixed order: `where`, `orderBy`, `skip`, `limit`.
//! Nothing here touches collection state.

mod fingerprint;
mod order;
mod parse;
mod predicate;


use crate::{
    error::{Error, ErrorOrigin},
    record::Record,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

// re-exports
pub use order::{Direction, OrderTerm};
pub use parse::RESERVED_KEYS;
pub use predicate::{Clause, Operator};

use order::compare_terms;
use predicate::CompiledFilter;

///
/// QueryError
///

#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error("invalid query params: {0}")]
    InvalidParams(String),

    #[error("unknown where operator '{0}'")]
    UnknownOperator(String),

    #[error("invalid operand for '{op}': {reason}")]
    InvalidOperand { op: &'static str, reason: String },
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Self::invalid_argument(ErrorOrigin::Query, err.to_string())
    }
}

///
/// FieldFilter
///
/// All clauses on one field, in declaration order.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FieldFilter {
    pub field: String,
    pub clauses: Vec<Clause>,
}

///
/// Query
///
/// Filter / order / page parameters. Build fluently or parse from JSON with
/// [`Query::from_json`].
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(rename = "where")]
    pub filters: Vec<FieldFilter>,
    pub order_by: Vec<OrderTerm>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// AND a clause onto `field`.
    #[must_use]
    pub fn filter(mut self, field: &str, op: Operator, operand: impl Into<Value>) -> Self {
        self.push_clause(field, Clause::and(op, operand.into()));
        self
    }

    /// OR a clause onto the running result for `field`.
    #[must_use]
    pub fn or_filter(mut self, field: &str, op: Operator, operand: impl Into<Value>) -> Self {
        self.push_clause(field, Clause::or(op, operand.into()));
        self
    }

    /// Shorthand for an `==` clause.
    #[must_use]
    pub fn eq(self, field: &str, operand: impl Into<Value>) -> Self {
        self.filter(field, Operator::Eq, operand)
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(OrderTerm::new(field, direction));
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn push_clause(&mut self, field: &str, clause: Clause) {
        if let Some(existing) = self.filters.iter_mut().find(|f| f.field == field) {
            existing.clauses.push(clause);
        } else {
            self.filters.push(FieldFilter {
                field: field.to_string(),
                clauses: vec![clause],
            });
        }
    }

    /// Parse the JSON parameter form (`where`, `orderBy`, bare equality keys).
    pub fn from_json(params: &serde_json::Value) -> Result<Self, QueryError> {
        parse::parse_query(params)
    }

    /// True when the query has no `where` clauses.
    #[must_use]
    pub const fn is_unfiltered(&self) -> bool {
        self.filters.is_empty()
    }

    /// Canonical digest of these parameters, used as a query-state key.
    /// Independent of the order fields were declared in.
    #[must_use]
    pub fn fingerprint(&self) -> QueryFingerprint {
        QueryFingerprint(fingerprint::hash_query(self))
    }
}

///
/// QueryFingerprint
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryFingerprint([u8; 32]);

impl QueryFingerprint {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Run the full pipeline over `items`, reading each item's record through
/// `record_of`. Ordering is stable: ties keep their input order.
pub fn filter<T, F>(items: Vec<T>, query: &Query, record_of: F) -> Result<Vec<T>, QueryError>
where
    F: Fn(&T) -> &Record,
{
    let compiled = CompiledFilter::compile(&query.filters)?;

    let mut out: Vec<T> = if query.filters.is_empty() {
        items
    } else {
        items
            .into_iter()
            .filter(|item| compiled.matches(record_of(item)))
            .collect()
    };

    if !query.order_by.is_empty() {
        out.sort_by(|a, b| compare_terms(&query.order_by, record_of(a), record_of(b)));
    }

    let skip = query.skip.unwrap_or(0);
    if skip >= out.len() {
        out.clear();
    } else if skip > 0 {
        out.drain(..skip);
    }

    if let Some(limit) = query.limit {
        out.truncate(limit);
    }

    Ok(out)
}
