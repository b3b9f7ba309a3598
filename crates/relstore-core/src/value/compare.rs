use crate::value::Value;
use std::cmp::Ordering;

///
/// Canonical Value Rank
///
/// Stable rank used for cross-variant ordering. `Null` ranks lowest so it
/// sorts before every non-null value in indexes and `orderBy`.
/// Integers and floats share a rank and compare numerically.
///
#[must_use]
pub const fn canonical_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Text(_) => 3,
        Value::List(_) => 4,
        Value::Map(_) => 5,
    }
}

/// Total canonical comparator used by ordered indexes.
///
/// Ordering rules:
/// 1. Canonical variant rank
/// 2. Variant-specific comparison for same-ranked values
#[must_use]
pub fn canonical_cmp(left: &Value, right: &Value) -> Ordering {
    let rank = canonical_rank(left).cmp(&canonical_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    canonical_cmp_same_rank(left, right)
}

fn canonical_cmp_same_rank(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.cmp(b),
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            numeric_cmp(left, right)
        }
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::List(a), Value::List(b)) => canonical_cmp_list(a, b),
        (Value::Map(a), Value::Map(b)) => {
            for ((left_key, left_value), (right_key, right_value)) in a.iter().zip(b.iter()) {
                let cmp = left_key
                    .cmp(right_key)
                    .then_with(|| canonical_cmp(left_value, right_value));
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }

            a.len().cmp(&b.len())
        }
        _ => Ordering::Equal,
    }
}

fn canonical_cmp_list(left: &[Value], right: &[Value]) -> Ordering {
    for (left, right) in left.iter().zip(right.iter()) {
        let cmp = canonical_cmp(left, right);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    left.len().cmp(&right.len())
}

// Both sides are known numeric; fall back to total ordering on f64.
fn numeric_cmp(left: &Value, right: &Value) -> Ordering {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        _ => Ordering::Equal,
    }
}

/// Strict equality (`===`): same variant and same value.
#[must_use]
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    left == right
}

/// Loose equality (`==`).
///
/// Numbers compare numerically across `Int`/`Float`, and numeric text equals
/// the number it parses to. Everything else falls back to strict equality.
#[must_use]
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (numeric_view(left), numeric_view(right)) {
        (Some(a), Some(b)) if left.is_numeric() || right.is_numeric() => a == b,
        _ => strict_eq(left, right),
    }
}

/// Loose ordering for `>`, `>=`, `<`, `<=`.
///
/// Returns `None` when the operands are not comparable; null never compares.
#[must_use]
pub fn loose_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ if left.is_numeric() || right.is_numeric() => {
            let (a, b) = (numeric_view(left)?, numeric_view(right)?);
            a.partial_cmp(&b)
        }
        _ => None,
    }
}

/// Comparator used by `orderBy`: null first, case-insensitive text,
/// canonical ordering otherwise.
#[must_use]
pub fn sort_cmp(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => {
            let (a, b) = (a.to_lowercase(), b.to_lowercase());
            a.cmp(&b)
        }
        _ => canonical_cmp(left, right),
    }
}

fn numeric_view(value: &Value) -> Option<f64> {
    match value {
        Value::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        other => other.as_f64(),
    }
}
