use crate::{
    query::{Clause, Direction, Operator, OrderTerm, Query, QueryError},
    value::Value,
};
use serde_json::{Map, Value as JsonValue};

/// Top-level keys that control the pipeline instead of filtering on a field.
pub const RESERVED_KEYS: [&str; 6] = ["where", "orderBy", "sort", "skip", "offset", "limit"];

pub(super) fn parse_query(params: &JsonValue) -> Result<Query, QueryError> {
    let JsonValue::Object(params) = params else {
        return Err(QueryError::InvalidParams(format!(
            "params must be an object, got {params}"
        )));
    };

    let mut query = Query::new();

    for (key, value) in params {
        match key.as_str() {
            "where" => parse_where(&mut query, value)?,
            "orderBy" | "sort" => query.order_by.extend(parse_order_by(value)?),
            "skip" | "offset" => query.skip = Some(parse_count(key, value)?),
            "limit" => query.limit = Some(parse_count(key, value)?),
            field => query.push_clause(field, Clause::and(Operator::Eq, value.clone().into())),
        }
    }

    Ok(query)
}

fn parse_where(query: &mut Query, value: &JsonValue) -> Result<(), QueryError> {
    let JsonValue::Object(fields) = value else {
        return Err(QueryError::InvalidParams(format!(
            "'where' must be an object, got {value}"
        )));
    };

    for (field, clause) in fields {
        match operator_map(clause) {
            Some(ops) => {
                for (raw_op, operand) in ops {
                    let (or, name) = match raw_op.strip_prefix('|') {
                        Some(name) => (true, name),
                        None => (false, raw_op.as_str()),
                    };
                    let op: Operator = name.parse()?;
                    let operand = Value::from(operand.clone());
                    let clause = if or {
                        Clause::or(op, operand)
                    } else {
                        Clause::and(op, operand)
                    };
                    query.push_clause(field, clause);
                }
            }
            None => query.push_clause(field, Clause::and(Operator::Eq, clause.clone().into())),
        }
    }

    Ok(())
}

// An object is an operator map only when every key names an operator;
// anything else is a literal compared with `==`.
fn operator_map(clause: &JsonValue) -> Option<&Map<String, JsonValue>> {
    let JsonValue::Object(map) = clause else {
        return None;
    };

    let all_ops = !map.is_empty()
        && map.keys().all(|k| {
            k.strip_prefix('|')
                .unwrap_or(k)
                .parse::<Operator>()
                .is_ok()
        });

    all_ops.then_some(map)
}

// Accepted forms: "age", ["age", "DESC"], [["age", "DESC"], ["name", "ASC"]],
// ["age", "name"] (each ascending).
fn parse_order_by(value: &JsonValue) -> Result<Vec<OrderTerm>, QueryError> {
    match value {
        JsonValue::String(field) => Ok(vec![OrderTerm::new(field, Direction::Asc)]),
        JsonValue::Array(items) if is_single_pair(items) => Ok(vec![parse_pair(items)?]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::String(field) => Ok(OrderTerm::new(field, Direction::Asc)),
                JsonValue::Array(pair) => parse_pair(pair),
                other => Err(QueryError::InvalidParams(format!(
                    "invalid orderBy entry {other}"
                ))),
            })
            .collect(),
        other => Err(QueryError::InvalidParams(format!("invalid orderBy {other}"))),
    }
}

fn is_single_pair(items: &[JsonValue]) -> bool {
    matches!(
        items,
        [JsonValue::String(_), JsonValue::String(dir)] if dir.parse::<Direction>().is_ok()
    )
}

fn parse_pair(pair: &[JsonValue]) -> Result<OrderTerm, QueryError> {
    match pair {
        [JsonValue::String(field)] => Ok(OrderTerm::new(field, Direction::Asc)),
        [JsonValue::String(field), JsonValue::String(dir)] => {
            Ok(OrderTerm::new(field, dir.parse()?))
        }
        other => Err(QueryError::InvalidParams(format!(
            "orderBy pair must be [field, direction], got {other:?}"
        ))),
    }
}

fn parse_count(key: &str, value: &JsonValue) -> Result<usize, QueryError> {
    value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| {
            QueryError::InvalidParams(format!(
                "'{key}' must be a non-negative integer, got {value}"
            ))
        })
}
