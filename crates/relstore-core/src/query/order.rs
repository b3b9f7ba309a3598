use crate::{
    query::QueryError,
    record::Record,
    value::sort_cmp,
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, str::FromStr};

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(QueryError::InvalidParams(format!(
                "orderBy direction must be ASC or DESC, got '{s}'"
            )))
        }
    }
}

///
/// OrderTerm
///
/// `field` may be a dotted path into nested maps.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OrderTerm {
    pub field: String,
    pub direction: Direction,
}

impl OrderTerm {
    #[must_use]
    pub fn new(field: &str, direction: Direction) -> Self {
        Self {
            field: field.to_string(),
            direction,
        }
    }
}

// Ties fall through to the next term; full ties report Equal so the caller's
// stable sort keeps input order.
pub(super) fn compare_terms(terms: &[OrderTerm], left: &Record, right: &Record) -> Ordering {
    for term in terms {
        let cmp = sort_cmp(
            left.value_at_path(&term.field),
            right.value_at_path(&term.field),
        );
        let cmp = match term.direction {
            Direction::Asc => cmp,
            Direction::Desc => cmp.reverse(),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    Ordering::Equal
}
