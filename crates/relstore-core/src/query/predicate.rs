use crate::{
    query::{FieldFilter, QueryError},
    record::Record,
    value::{Value, loose_cmp, loose_eq, strict_eq},
};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};

///
/// Operator
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "===")]
    StrictEq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "!==")]
    StrictNe,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "notIn")]
    NotIn,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "notLike")]
    NotLike,
    #[serde(rename = "likei")]
    Likei,
    #[serde(rename = "isectEmpty")]
    IsectEmpty,
    #[serde(rename = "isectNotEmpty")]
    IsectNotEmpty,
}

impl Operator {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::Ne => "!=",
            Self::StrictNe => "!==",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Like => "like",
            Self::NotLike => "notLike",
            Self::Likei => "likei",
            Self::IsectEmpty => "isectEmpty",
            Self::IsectNotEmpty => "isectNotEmpty",
        }
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "==" => Self::Eq,
            "===" => Self::StrictEq,
            "!=" => Self::Ne,
            "!==" => Self::StrictNe,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            "in" => Self::In,
            "notIn" => Self::NotIn,
            "like" => Self::Like,
            "notLike" => Self::NotLike,
            "likei" => Self::Likei,
            "isectEmpty" => Self::IsectEmpty,
            "isectNotEmpty" => Self::IsectNotEmpty,
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };

        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

///
/// Clause
///
/// One `operator -> operand` test. `or` chains it to the running result for
/// its field with OR instead of AND (the `|op` form).
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Clause {
    pub op: Operator,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub or: bool,
    pub operand: Value,
}

impl Clause {
    #[must_use]
    pub const fn and(op: Operator, operand: Value) -> Self {
        Self {
            op,
            or: false,
            operand,
        }
    }

    #[must_use]
    pub const fn or(op: Operator, operand: Value) -> Self {
        Self {
            op,
            or: true,
            operand,
        }
    }
}

///
/// CompiledClause
///
/// Clause with its `like` pattern compiled once per filter call.
///

#[derive(Debug)]
struct CompiledClause<'q> {
    clause: &'q Clause,
    pattern: Option<Regex>,
}

///
/// CompiledFilter
///

#[derive(Debug)]
pub(crate) struct CompiledFilter<'q> {
    fields: Vec<(&'q str, Vec<CompiledClause<'q>>)>,
}

impl<'q> CompiledFilter<'q> {
    pub(crate) fn compile(filters: &'q [FieldFilter]) -> Result<Self, QueryError> {
        let mut fields = Vec::with_capacity(filters.len());

        for filter in filters {
            let mut clauses = Vec::with_capacity(filter.clauses.len());
            for clause in &filter.clauses {
                let pattern = match clause.op {
                    Operator::Like | Operator::NotLike => Some(like_regex(&clause.operand, false)?),
                    Operator::Likei => Some(like_regex(&clause.operand, true)?),
                    _ => None,
                };
                clauses.push(CompiledClause { clause, pattern });
            }
            fields.push((filter.field.as_str(), clauses));
        }

        Ok(Self { fields })
    }

    /// Fields are AND-ed; clauses within a field chain left to right.
    pub(crate) fn matches(&self, record: &Record) -> bool {
        self.fields.iter().all(|(field, clauses)| {
            let value = record.value_at_path(field);
            let mut result: Option<bool> = None;

            for compiled in clauses {
                let hit = eval_clause(compiled, value);
                result = Some(match result {
                    None => hit,
                    Some(acc) if compiled.clause.or => acc || hit,
                    Some(acc) => acc && hit,
                });
            }

            result.unwrap_or(true)
        })
    }
}

fn eval_clause(compiled: &CompiledClause<'_>, value: &Value) -> bool {
    let operand = &compiled.clause.operand;

    match compiled.clause.op {
        Operator::Eq => loose_eq(value, operand),
        Operator::StrictEq => strict_eq(value, operand),
        Operator::Ne => !loose_eq(value, operand),
        Operator::StrictNe => !strict_eq(value, operand),
        Operator::Gt => loose_cmp(value, operand) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            loose_cmp(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => loose_cmp(value, operand) == Some(Ordering::Less),
        Operator::Lte => matches!(
            loose_cmp(value, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => contains(operand, value),
        Operator::NotIn => !contains(operand, value),
        Operator::Like | Operator::Likei => like_match(compiled.pattern.as_ref(), value),
        Operator::NotLike => !like_match(compiled.pattern.as_ref(), value),
        Operator::IsectEmpty => !intersects(value, operand),
        Operator::IsectNotEmpty => intersects(value, operand),
    }
}

// `in` against text is substring containment; against a list it is membership.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Text(text), Value::Text(part)) => text.contains(part.as_str()),
        (Value::List(items), needle) => items.iter().any(|item| loose_eq(item, needle)),
        _ => false,
    }
}

fn intersects(left: &Value, right: &Value) -> bool {
    let right = right.members();
    left.members()
        .iter()
        .any(|l| right.iter().any(|r| loose_eq(l, r)))
}

fn like_match(pattern: Option<&Regex>, value: &Value) -> bool {
    match (pattern, value) {
        (Some(pattern), Value::Text(text)) => pattern.is_match(text),
        _ => false,
    }
}

/// Translate a SQL-style `%`/`_` pattern into an anchored regex.
pub(crate) fn like_regex(operand: &Value, case_insensitive: bool) -> Result<Regex, QueryError> {
    let Value::Text(pattern) = operand else {
        return Err(QueryError::InvalidOperand {
            op: "like",
            reason: format!("pattern must be text, got {operand}"),
        });
    };

    let mut source = String::with_capacity(pattern.len() + 2);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|err| QueryError::InvalidOperand {
            op: "like",
            reason: err.to_string(),
        })
}
