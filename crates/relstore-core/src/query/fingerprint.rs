//! Deterministic hash encoding of query parameters.
//!
//! Field filters are hashed in field-name order; clauses keep their order
//! within a field since `|` chaining depends on it. `orderBy` terms keep
//! their declared order.
#![expect(clippy::cast_possible_truncation)]

use crate::{
    query::{Clause, Direction, FieldFilter, OrderTerm, Query},
    value::Value,
};
use sha2::{Digest, Sha256};

pub(super) fn hash_query(query: &Query) -> [u8; 32] {
    let mut hasher = Sha256::new();

    let mut filters: Vec<&FieldFilter> = query.filters.iter().collect();
    filters.sort_by(|a, b| a.field.cmp(&b.field));

    write_tag(&mut hasher, 0x01);
    write_u32(&mut hasher, filters.len() as u32);
    for filter in filters {
        write_str(&mut hasher, &filter.field);
        write_u32(&mut hasher, filter.clauses.len() as u32);
        for clause in &filter.clauses {
            write_clause(&mut hasher, clause);
        }
    }

    write_tag(&mut hasher, 0x02);
    write_u32(&mut hasher, query.order_by.len() as u32);
    for term in &query.order_by {
        write_order(&mut hasher, term);
    }

    write_tag(&mut hasher, 0x03);
    write_page(&mut hasher, query.skip);
    write_page(&mut hasher, query.limit);

    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());

    out
}

fn write_clause(hasher: &mut Sha256, clause: &Clause) {
    write_tag(hasher, if clause.or { 0x21 } else { 0x20 });
    write_str(hasher, clause.op.symbol());
    write_value(hasher, &clause.operand);
}

fn write_order(hasher: &mut Sha256, term: &OrderTerm) {
    write_str(hasher, &term.field);
    write_tag(
        hasher,
        match term.direction {
            Direction::Asc => 0x01,
            Direction::Desc => 0x02,
        },
    );
}

fn write_page(hasher: &mut Sha256, value: Option<usize>) {
    match value {
        None => write_tag(hasher, 0x00),
        Some(n) => {
            write_tag(hasher, 0x01);
            hasher.update((n as u64).to_be_bytes());
        }
    }
}

fn write_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => write_tag(hasher, 0x40),
        Value::Bool(b) => {
            write_tag(hasher, 0x41);
            write_tag(hasher, u8::from(*b));
        }
        Value::Int(i) => {
            write_tag(hasher, 0x42);
            hasher.update(i.to_be_bytes());
        }
        Value::Float(f) => {
            write_tag(hasher, 0x43);
            hasher.update(f.get().to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            write_tag(hasher, 0x44);
            write_str(hasher, s);
        }
        Value::List(items) => {
            write_tag(hasher, 0x45);
            write_u32(hasher, items.len() as u32);
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Map(entries) => {
            write_tag(hasher, 0x46);
            write_u32(hasher, entries.len() as u32);
            for (key, item) in entries {
                write_str(hasher, key);
                write_value(hasher, item);
            }
        }
    }
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}
