use crate::{
    change::{ChangeOptions, ComputedProperty},
    clock::ManualClock,
    collection::{CollectionDef, QueryKey},
    config::{CollectionConfig, IgnoreRule, IndexDef, OnConflict, ReapAction},
    error::ErrorKind,
    event::{Event, EventKind, EventScope},
    query::Query,
    record::Record,
    store::{AddOptions, Store},
    value::Value,
};
use serde_json::json;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

fn rec(value: serde_json::Value) -> Record {
    Record::from_json(value).unwrap()
}

fn store_at(now: u64) -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let store = Store::with_clock(clock.clone());

    (store, clock)
}

fn define(store: &mut Store, name: &str, config: CollectionConfig) {
    store
        .define_collection(CollectionDef::new(name).with_config(config))
        .unwrap();
}

// ----------------------------------------------------------------------
// Collections and add
// ----------------------------------------------------------------------

#[test]
fn unknown_and_duplicate_collections_are_rejected() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let err = store.get("nope", 1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownCollection);

    let err = store
        .define_collection(CollectionDef::new("items"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateCollection);
}

#[test]
fn merge_re_add_keeps_identity_and_overwrites_supplied_fields() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let first = store.add_one("items", rec(json!({ "id": 1, "a": 1, "b": 2 }))).unwrap();
    let again = store
        .add("items", vec![rec(json!({ "id": 1, "b": 3 }))], AddOptions::default())
        .unwrap();

    assert_eq!(again, vec![first]);
    assert_eq!(
        store.record("items", first).unwrap(),
        &rec(json!({ "id": 1, "a": 1, "b": 3 }))
    );
    assert_eq!(store.collection("items").unwrap().len(), 1);
}

#[test]
fn replace_re_add_substitutes_fields_under_a_new_identity() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let first = store.add_one("items", rec(json!({ "id": 1, "a": 1, "b": 2 }))).unwrap();
    let opts = AddOptions::default().with_on_conflict(OnConflict::Replace);
    let second = store
        .add("items", vec![rec(json!({ "id": 1, "b": 3 }))], opts)
        .unwrap()[0];

    assert_ne!(first, second);
    assert_eq!(
        store.get("items", 1).unwrap(),
        Some(&rec(json!({ "id": 1, "b": 3 })))
    );
    assert!(store.record("items", first).unwrap_err().is_not_found());
}

#[test]
fn sync_re_add_resets_the_snapshot_but_local_add_does_not() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let h = store.add_one("items", rec(json!({ "id": 1, "a": 1 }))).unwrap();
    store
        .add("items", vec![rec(json!({ "id": 1, "a": 2 }))], AddOptions::default())
        .unwrap();
    assert!(!store.has_changes("items", h).unwrap());

    store
        .add("items", vec![rec(json!({ "id": 1, "a": 3 }))], AddOptions::default().local())
        .unwrap();
    let changes = store
        .changes("items", h, &ChangeOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(changes.changed.get("a"), Some(&Value::Int(3)));
}

#[test]
fn add_json_accepts_objects_and_arrays_only() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let handles = store
        .add_json("items", json!([{ "id": 1 }, { "id": 2 }]), AddOptions::default())
        .unwrap();
    assert_eq!(handles.len(), 2);

    let err = store
        .add_json("items", json!(5), AddOptions::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert!(err.message.contains("invalid record type"));

    let err = store
        .add_json("items", json!([{ "id": 3 }, "x"]), AddOptions::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[test]
fn unkeyed_records_stay_unsaved_until_they_get_a_key() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let keyed = store.add_one("items", rec(json!({ "id": 1 }))).unwrap();
    let draft = store.add_one("items", rec(json!({ "name": "draft" }))).unwrap();

    assert_eq!(store.get_all("items", &[], None).unwrap(), vec![keyed, draft]);
    assert_eq!(store.collection("items").unwrap().unsaved(), &[draft]);

    store.update("items", draft, rec(json!({ "id": 5 }))).unwrap();

    assert!(store.collection("items").unwrap().unsaved().is_empty());
    assert_eq!(store.get_handle("items", 5).unwrap(), Some(draft));
}

// ----------------------------------------------------------------------
// Mutation and change tracking
// ----------------------------------------------------------------------

#[test]
fn changes_report_against_the_clean_snapshot() {
    let (mut store, clock) = store_at(1_000);
    define(&mut store, "items", CollectionConfig::new());

    let h = store.add_one("items", rec(json!({ "id": 1, "a": 1 }))).unwrap();
    assert!(store.changes("items", h, &ChangeOptions::default()).unwrap().is_none());

    assert!(store.update("items", h, rec(json!({ "a": 2, "c": 3 }))).unwrap());
    let changes = store
        .changes("items", h, &ChangeOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(changes.added.get("c"), Some(&Value::Int(3)));
    assert_eq!(changes.changed.get("a"), Some(&Value::Int(2)));
    assert!(changes.removed.is_empty());
    assert_eq!(store.previous("items", h).unwrap(), &rec(json!({ "id": 1, "a": 1 })));

    let narrowed = store
        .changes(
            "items",
            h,
            &ChangeOptions::default().ignoring(IgnoreRule::Field("c".into())),
        )
        .unwrap()
        .unwrap();
    assert!(narrowed.added.is_empty());

    clock.advance(10);
    store.commit("items", h).unwrap();
    assert!(!store.has_changes("items", h).unwrap());
    assert_eq!(store.last_saved("items", h).unwrap(), Some(1_010));

    store.record_mut("items", h).unwrap().remove("a");
    assert!(store.notify_changed("items", h).unwrap());
    let changes = store
        .changes("items", h, &ChangeOptions::default())
        .unwrap()
        .unwrap();
    assert!(changes.removed.contains("a"));
}

#[test]
fn update_without_effective_change_reports_false() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let h = store.add_one("items", rec(json!({ "id": 1, "a": 1 }))).unwrap();

    assert!(!store.update("items", h, rec(json!({ "a": 1 }))).unwrap());
}

#[test]
fn ignored_fields_do_not_register_as_changes() {
    let (mut store, _) = store_at(0);
    let config = CollectionConfig::new().with_ignored(IgnoreRule::Pattern("^_".into()));
    define(&mut store, "items", config);

    let h = store.add_one("items", rec(json!({ "id": 1, "_seen": 1 }))).unwrap();

    assert!(!store.update("items", h, rec(json!({ "_seen": 2 }))).unwrap());
    assert!(!store.has_changes("items", h).unwrap());
}

#[test]
fn key_collision_on_update_is_rejected_and_rolled_back() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    let one = store.add_one("items", rec(json!({ "id": 1 }))).unwrap();
    let two = store.add_one("items", rec(json!({ "id": 2 }))).unwrap();

    let err = store.update("items", two, rec(json!({ "id": 1 }))).unwrap_err();

    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(store.record("items", two).unwrap().value("id"), &Value::Int(2));
    assert_eq!(store.get_handle("items", 1).unwrap(), Some(one));
    assert_eq!(store.get_handle("items", 2).unwrap(), Some(two));
}

#[test]
fn digest_picks_up_direct_field_writes_and_reindexes() {
    let (mut store, _) = store_at(0);
    let config = CollectionConfig::new().with_index(IndexDef::new("by_name", ["name"]));
    define(&mut store, "people", config);

    let h = store.add_one("people", rec(json!({ "id": 1, "name": "ann" }))).unwrap();
    store.record_mut("people", h).unwrap().set("name", "bob");

    assert_eq!(store.digest().unwrap(), 1);
    assert_eq!(
        store.get_all("people", &["bob".into()], Some("by_name")).unwrap(),
        vec![h]
    );
    assert!(store
        .get_all("people", &["ann".into()], Some("by_name"))
        .unwrap()
        .is_empty());
    assert_eq!(store.digest().unwrap(), 0);
}

#[test]
fn computed_properties_follow_their_dependencies() {
    let (mut store, _) = store_at(0);
    let full_name = ComputedProperty::new("full", ["first", "last"], |record: &Record| {
        let first = record.value("first").as_text().unwrap_or_default();
        let last = record.value("last").as_text().unwrap_or_default();
        Value::from(format!("{first} {last}"))
    });
    let def = CollectionDef::new("people")
        .with_config(CollectionConfig::new().with_index(IndexDef::new("by_full", ["full"])))
        .with_computed(full_name);
    store.define_collection(def).unwrap();

    let h = store
        .add_one("people", rec(json!({ "id": 1, "first": "ada", "last": "byron" })))
        .unwrap();
    assert_eq!(store.record("people", h).unwrap().value("full"), &Value::from("ada byron"));

    store.update("people", h, rec(json!({ "last": "lovelace" }))).unwrap();

    assert_eq!(
        store.record("people", h).unwrap().value("full"),
        &Value::from("ada lovelace")
    );
    assert_eq!(
        store
            .get_all("people", &["ada lovelace".into()], Some("by_full"))
            .unwrap(),
        vec![h]
    );
}

#[test]
fn last_modified_is_strictly_monotonic_under_a_frozen_clock() {
    let (mut store, _) = store_at(5_000);
    define(&mut store, "items", CollectionConfig::new());

    let h = store.add_one("items", rec(json!({ "id": 1, "a": 0 }))).unwrap();
    let mut seen = vec![store.last_modified("items", Some(h)).unwrap()];
    for a in 1..4 {
        store.update("items", h, rec(json!({ "a": a }))).unwrap();
        seen.push(store.last_modified("items", Some(h)).unwrap());
    }

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert!(store.last_modified("items", None).unwrap() >= seen[3]);
}

#[test]
fn change_history_is_kept_when_enabled() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new().with_change_history(true));

    let h = store.add_one("items", rec(json!({ "id": 1, "a": 1 }))).unwrap();
    store.update("items", h, rec(json!({ "a": 2 }))).unwrap();
    store.update("items", h, rec(json!({ "a": 3 }))).unwrap();

    let history = store.change_history("items", h).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].changes.changed.get("a"), Some(&Value::Int(3)));
    assert_eq!(history[1].key, Value::Int(1));
    assert!(history[0].timestamp < history[1].timestamp);
    assert_eq!(store.collection_history("items").unwrap().len(), 2);
}

// ----------------------------------------------------------------------
// Remove
// ----------------------------------------------------------------------

#[test]
fn remove_all_clears_matching_records_and_query_state() {
    let (mut store, _) = store_at(0);
    define(&mut store, "people", CollectionConfig::new());
    for (id, age) in [(1, 30), (2, 31), (3, 32), (4, 33)] {
        store.add_one("people", rec(json!({ "id": id, "age": age }))).unwrap();
    }

    let listed = Query::new().limit(10);
    store.mark_completed("people", QueryKey::from(&listed)).unwrap();
    store.mark_completed("people", QueryKey::Record(Value::Int(1))).unwrap();

    let older = Query::from_json(&json!({ "where": { "age": { ">": 31 } } })).unwrap();
    let removed = store.remove_all("people", &older).unwrap();

    assert_eq!(removed.len(), 2);
    assert_eq!(store.collection("people").unwrap().len(), 2);
    assert!(!store.is_completed("people", &QueryKey::from(&listed)).unwrap());
    assert!(store.is_completed("people", &QueryKey::Record(Value::Int(1))).unwrap());
}

#[test]
fn remove_by_key_and_by_keys() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());
    for id in 1..=4 {
        store.add_one("items", rec(json!({ "id": id }))).unwrap();
    }

    assert!(store.remove("items", 1).unwrap().is_some());
    assert!(store.remove("items", 1).unwrap().is_none());

    let removed = store
        .remove_keys("items", &[Value::Int(2), Value::Int(9), Value::Int(3)])
        .unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(store.get_all("items", &[], None).unwrap().len(), 1);
}

// ----------------------------------------------------------------------
// Expiry
// ----------------------------------------------------------------------

fn expiring(action: ReapAction) -> CollectionConfig {
    CollectionConfig::new()
        .with_max_age(Duration::from_millis(100))
        .with_reap_action(action)
        .with_index(IndexDef::new("by_name", ["name"]))
}

#[test]
fn eject_removes_expired_records_from_every_index() {
    let (mut store, clock) = store_at(1_000);
    define(&mut store, "people", expiring(ReapAction::Eject));
    let h = store.add_one("people", rec(json!({ "id": 1, "name": "ann" }))).unwrap();

    clock.set(1_050);
    assert!(store.reap("people").unwrap().is_empty());
    assert!(!store.is_expired("people", h).unwrap());

    clock.set(1_150);
    let report = store.reap("people").unwrap();

    assert_eq!(report.expired, vec![h]);
    assert_eq!(report.ejected.len(), 1);
    assert_eq!(store.get("people", 1).unwrap(), None);
    assert!(store
        .get_all("people", &["ann".into()], Some("by_name"))
        .unwrap()
        .is_empty());
    assert!(store.get_all("people", &[], Some("by_name")).unwrap().is_empty());
    assert!(store.record("people", h).is_err());
}

#[test]
fn inject_keeps_expired_records_marked() {
    let (mut store, clock) = store_at(1_000);
    define(
        &mut store,
        "people",
        CollectionConfig::new().with_max_age(Duration::from_millis(100)),
    );
    let h = store.add_one("people", rec(json!({ "id": 1 }))).unwrap();

    clock.set(1_150);
    assert_eq!(store.reap("people").unwrap().expired, vec![h]);
    assert!(store.is_expired("people", h).unwrap());
    assert_eq!(store.reap("people").unwrap().expired, vec![h]);

    // a sync re-add re-arms the entry from now
    store.add_one("people", rec(json!({ "id": 1 }))).unwrap();
    assert!(!store.is_expired("people", h).unwrap());
    assert!(store.reap("people").unwrap().is_empty());
}

#[test]
fn refresh_reports_keys_and_keeps_records() {
    let (mut store, clock) = store_at(0);
    define(&mut store, "people", expiring(ReapAction::Refresh));
    store.add_one("people", rec(json!({ "id": 7, "name": "x" }))).unwrap();

    clock.set(500);
    let report = store.reap("people").unwrap();

    assert_eq!(report.refresh, vec![Value::Int(7)]);
    assert!(report.ejected.is_empty());
    assert!(store.get("people", 7).unwrap().is_some());
}

#[test]
fn commit_re_arms_expiry() {
    let (mut store, clock) = store_at(0);
    define(&mut store, "people", expiring(ReapAction::Eject));
    let h = store.add_one("people", rec(json!({ "id": 1 }))).unwrap();

    clock.set(90);
    store.commit("people", h).unwrap();
    clock.set(150);

    assert!(store.reap("people").unwrap().is_empty());
    assert!(store.get("people", 1).unwrap().is_some());
}

// ----------------------------------------------------------------------
// Events and metrics
// ----------------------------------------------------------------------

fn recorder(log: &Arc<Mutex<Vec<String>>>) -> impl Fn(&Event) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |event: &Event| log.lock().unwrap().push(event.kind.to_string())
}

#[test]
fn events_fire_in_mutation_order() {
    let (mut store, _) = store_at(0);
    define(&mut store, "people", CollectionConfig::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    for kind in [
        EventKind::Add,
        EventKind::Change,
        EventKind::ChangeField("age".into()),
        EventKind::ChangeField("name".into()),
        EventKind::Remove,
    ] {
        store.subscribe(
            EventScope::Collection("people".into()),
            kind,
            recorder(&log),
        );
    }

    let h = store.add_one("people", rec(json!({ "id": 1, "age": 30 }))).unwrap();
    store.update("people", h, rec(json!({ "age": 31 }))).unwrap();
    store.remove("people", 1).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["add", "change", "change:age", "remove"]);
}

#[test]
fn record_scoped_listeners_only_hear_their_record() {
    let (mut store, _) = store_at(0);
    define(&mut store, "people", CollectionConfig::new());
    let a = store.add_one("people", rec(json!({ "id": 1, "age": 30 }))).unwrap();
    let b = store.add_one("people", rec(json!({ "id": 2, "age": 40 }))).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let id = store.subscribe(
        EventScope::Record("people".into(), a),
        EventKind::Change,
        recorder(&log),
    );

    store.update("people", b, rec(json!({ "age": 41 }))).unwrap();
    store.update("people", a, rec(json!({ "age": 31 }))).unwrap();
    assert!(store.unsubscribe(id));
    store.update("people", a, rec(json!({ "age": 32 }))).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["change"]);
}

#[test]
fn metrics_count_mutations_per_collection() {
    let (mut store, _) = store_at(0);
    define(&mut store, "items", CollectionConfig::new());

    store.add_one("items", rec(json!({ "id": 1 }))).unwrap();
    store.add_one("items", rec(json!({ "id": 2 }))).unwrap();
    store.add_one("items", rec(json!({ "id": 2, "x": 1 }))).unwrap();
    store.remove("items", 1).unwrap();
    store.filter("items", &Query::new()).unwrap();

    let report = store.metrics_report();
    assert_eq!(report.ops.inserts, 2);
    assert_eq!(report.ops.merges, 1);
    assert_eq!(report.ops.removes, 1);
    assert_eq!(report.ops.queries, 1);
    assert_eq!(report.collections["items"].inserts, 2);
}

// ----------------------------------------------------------------------
// Query
// ----------------------------------------------------------------------

#[test]
fn filter_json_runs_the_query_pipeline() {
    let (mut store, _) = store_at(0);
    define(&mut store, "people", CollectionConfig::new());
    for (id, age) in [(1, 30), (2, 31), (3, 32), (4, 33), (5, 33)] {
        store.add_one("people", rec(json!({ "id": id, "age": age }))).unwrap();
    }

    let handles = store
        .filter_json(
            "people",
            &json!({
                "where": { "age": { ">": 30 } },
                "orderBy": [["age", "DESC"]],
                "skip": 1,
                "limit": 2,
            }),
        )
        .unwrap();
    let ids: Vec<&Value> = store
        .records("people", &handles)
        .unwrap()
        .into_iter()
        .map(|r| r.value("id"))
        .collect();

    assert_eq!(ids, vec![&Value::Int(5), &Value::Int(3)]);

    let err = store.filter_json("people", &json!({ "limit": -1 })).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}
