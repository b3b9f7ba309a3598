use crate::{
    arena::{Arena, Handle},
    index::{IndexError, IndexKey, OrderedIndex, RangeOptions},
    value::Value,
};
use proptest::prelude::*;

// ---- helpers -----------------------------------------------------------

fn handles(n: usize) -> Vec<Handle> {
    let mut arena = Arena::new();
    (0..n).map(|i| arena.insert(i)).collect()
}

fn key(v: i64) -> IndexKey {
    IndexKey::single(Value::Int(v))
}

fn composite(a: i64, b: &str) -> IndexKey {
    IndexKey::new(vec![Value::Int(a), Value::from(b)])
}

fn keyed(index: &OrderedIndex) -> Vec<Handle> {
    index.handles().collect()
}

#[test]
fn equal_keys_keep_insertion_order() {
    let h = handles(3);
    let mut index = OrderedIndex::new("age", vec!["age".into()]);
    index.insert(key(5), h[0]);
    index.insert(key(1), h[1]);
    index.insert(key(5), h[2]);

    assert_eq!(keyed(&index), vec![h[1], h[0], h[2]]);
}

#[test]
fn null_keys_sort_first() {
    let h = handles(2);
    let mut index = OrderedIndex::new("age", vec!["age".into()]);
    index.insert(key(-100), h[0]);
    index.insert(IndexKey::single(Value::Null), h[1]);

    assert_eq!(keyed(&index), vec![h[1], h[0]]);
}

#[test]
fn remove_matches_identity_among_equal_keys() {
    let h = handles(3);
    let mut index = OrderedIndex::new("age", vec!["age".into()]);
    for handle in &h {
        index.insert(key(7), *handle);
    }

    index.remove(&key(7), h[1]).unwrap();
    assert_eq!(keyed(&index), vec![h[0], h[2]]);

    let err = index.remove(&key(7), h[1]).unwrap_err();
    assert!(matches!(err, IndexError::NotFound { .. }));
}

#[test]
fn remove_under_wrong_key_is_not_found() {
    let h = handles(1);
    let mut index = OrderedIndex::new("age", vec!["age".into()]);
    index.insert(key(1), h[0]);

    assert!(index.remove(&key(2), h[0]).is_err());
    assert_eq!(index.len(), 1);
}

#[test]
fn composite_prefix_lookup_matches_leading_fields() {
    let h = handles(4);
    let mut index = OrderedIndex::new("status_name", vec!["status".into(), "name".into()]);
    index.insert(composite(2, "b"), h[0]);
    index.insert(composite(1, "z"), h[1]);
    index.insert(composite(2, "a"), h[2]);
    index.insert(composite(3, "a"), h[3]);

    let prefix: Vec<_> = index.get(&[Value::Int(2)]).iter().map(|e| e.handle).collect();
    assert_eq!(prefix, vec![h[2], h[0]]);

    let exact: Vec<_> = index
        .get(&[Value::Int(2), Value::from("b")])
        .iter()
        .map(|e| e.handle)
        .collect();
    assert_eq!(exact, vec![h[0]]);

    assert!(index.get(&[Value::Int(9)]).is_empty());
}

#[test]
fn range_honours_inclusivity_flags() {
    let h = handles(5);
    let mut index = OrderedIndex::new("age", vec!["age".into()]);
    for (i, handle) in h.iter().enumerate() {
        index.insert(key(i64::try_from(i).unwrap() * 10), *handle);
    }

    let scan = |left_inclusive, right_inclusive| -> Vec<Handle> {
        let opts = RangeOptions {
            left_inclusive,
            right_inclusive,
            ..RangeOptions::default()
        };
        index
            .range(Some(&[Value::Int(10)]), Some(&[Value::Int(30)]), opts)
            .iter()
            .map(|e| e.handle)
            .collect()
    };

    assert_eq!(scan(true, false), vec![h[1], h[2]]);
    assert_eq!(scan(true, true), vec![h[1], h[2], h[3]]);
    assert_eq!(scan(false, true), vec![h[2], h[3]]);
    assert_eq!(scan(false, false), vec![h[2]]);
}

#[test]
fn range_pages_with_offset_and_limit() {
    let h = handles(5);
    let mut index = OrderedIndex::new("age", vec!["age".into()]);
    for (i, handle) in h.iter().enumerate() {
        index.insert(key(i64::try_from(i).unwrap()), *handle);
    }

    let opts = RangeOptions {
        offset: 1,
        limit: Some(2),
        ..RangeOptions::inclusive()
    };
    let page: Vec<_> = index.range(None, None, opts).iter().map(|e| e.handle).collect();
    assert_eq!(page, vec![h[1], h[2]]);

    let past_end = RangeOptions {
        offset: 10,
        ..RangeOptions::inclusive()
    };
    assert!(index.range(None, None, past_end).is_empty());
}

proptest! {
    #[test]
    fn index_stays_sorted_and_bijective(
        ops in prop::collection::vec((0i64..20, any::<bool>()), 1..120),
    ) {
        let mut arena = Arena::new();
        let mut live: Vec<(i64, Handle)> = Vec::new();
        let mut index = OrderedIndex::new("n", vec!["n".into()]);

        for (value, insert) in ops {
            if insert || live.is_empty() {
                let handle = arena.insert(value);
                index.insert(key(value), handle);
                live.push((value, handle));
            } else {
                let pos = usize::try_from(value).unwrap() % live.len();
                let (value, handle) = live.remove(pos);
                arena.remove(handle);
                index.remove(&key(value), handle).unwrap();
            }
        }

        prop_assert_eq!(index.len(), live.len());
        prop_assert!(index.entries().windows(2).all(|w| w[0].key <= w[1].key));
        for (value, handle) in &live {
            let hits = index
                .get(&[Value::Int(*value)])
                .iter()
                .filter(|e| e.handle == *handle)
                .count();
            prop_assert_eq!(hits, 1);
        }
    }
}
