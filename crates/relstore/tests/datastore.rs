use futures::{FutureExt, future::BoxFuture};
use relstore::prelude::*;
use relstore::{AdapterError, ErrorKind, core::clock::ManualClock, core::error::ErrorDetail};
use serde_json::json;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    },
    time::Duration,
};

// ----------------------------------------------------------------------
// adapter double
// ----------------------------------------------------------------------

#[derive(Default)]
struct MockAdapter {
    rows: Mutex<BTreeMap<i64, Record>>,
    calls: AtomicUsize,
    failures: AtomicUsize,
    next_id: AtomicI64,
    delay: Duration,
}

impl MockAdapter {
    fn with_rows(rows: impl IntoIterator<Item = serde_json::Value>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| {
                let record = Record::from_json(row).unwrap();
                (record.value("id").as_int().unwrap(), record)
            })
            .collect();

        Self {
            rows: Mutex::new(rows),
            next_id: AtomicI64::new(100),
            delay: Duration::from_millis(20),
            ..Self::default()
        }
    }

    fn failing(self, times: usize) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn row(&self, id: i64) -> Option<Record> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    fn respond<T: Send + 'static>(
        &self,
        result: Result<T, AdapterError>,
    ) -> BoxFuture<'static, Result<T, AdapterError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(AdapterError::new("backend unavailable").with_status(500))
        } else {
            result
        };
        let delay = self.delay;

        async move {
            tokio::time::sleep(delay).await;
            result
        }
        .boxed()
    }
}

impl Adapter for MockAdapter {
    fn find(
        &self,
        _collection: &str,
        key: &Value,
    ) -> BoxFuture<'static, Result<Record, AdapterError>> {
        let found = key
            .as_int()
            .and_then(|id| self.row(id))
            .ok_or_else(|| AdapterError::new(format!("no record {key}")).with_status(404));

        self.respond(found)
    }

    fn find_all(
        &self,
        _collection: &str,
        _query: &Query,
    ) -> BoxFuture<'static, Result<Vec<Record>, AdapterError>> {
        let rows = self.rows.lock().unwrap().values().cloned().collect();

        self.respond(Ok(rows))
    }

    fn create(
        &self,
        _collection: &str,
        mut record: Record,
    ) -> BoxFuture<'static, Result<Record, AdapterError>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.set("id", id);
        self.rows.lock().unwrap().insert(id, record.clone());

        self.respond(Ok(record))
    }

    fn update(
        &self,
        _collection: &str,
        record: Record,
    ) -> BoxFuture<'static, Result<Record, AdapterError>> {
        let id = record.value("id").as_int().unwrap_or_default();
        self.rows.lock().unwrap().insert(id, record.clone());

        self.respond(Ok(record))
    }

    fn destroy(
        &self,
        _collection: &str,
        key: Value,
    ) -> BoxFuture<'static, Result<(), AdapterError>> {
        if let Some(id) = key.as_int() {
            self.rows.lock().unwrap().remove(&id);
        }

        self.respond(Ok(()))
    }
}

fn data_store(adapter: &Arc<MockAdapter>, config: CollectionConfig) -> DataStore {
    let mut store = Store::new();
    store
        .define_collection(CollectionDef::new("items").with_config(config))
        .unwrap();

    DataStore::new(store, Arc::clone(adapter))
}

// ----------------------------------------------------------------------
// single-flight
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn concurrent_finds_share_one_fetch() {
    let adapter = Arc::new(MockAdapter::with_rows([json!({ "id": 5, "name": "five" })]));
    let ds = data_store(&adapter, CollectionConfig::new());

    let (a, b) = tokio::join!(
        ds.find("items", 5, FetchOptions::default()),
        ds.find("items", 5, FetchOptions::default()),
    );

    assert_eq!(adapter.calls(), 1);
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(ds.pending_fetches(), 0);

    let report = ds.read().metrics_report();
    assert_eq!(report.ops.fetches_started, 1);
    assert_eq!(report.ops.fetches_joined, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_reaches_every_caller_and_clears_pending() {
    let adapter = Arc::new(MockAdapter::with_rows([json!({ "id": 5 })]).failing(1));
    let ds = data_store(&adapter, CollectionConfig::new());

    let (a, b) = tokio::join!(
        ds.find("items", 5, FetchOptions::default()),
        ds.find("items", 5, FetchOptions::default()),
    );
    let (a, b) = (a.unwrap_err(), b.unwrap_err());

    assert_eq!(adapter.calls(), 1);
    assert_eq!(a.kind, ErrorKind::Adapter);
    assert!(matches!(
        a.detail,
        Some(ErrorDetail::Adapter(AdapterError { status: Some(500), .. }))
    ));
    assert_eq!(a.message, b.message);
    assert_eq!(ds.pending_fetches(), 0);
    assert_eq!(ds.read().metrics_report().ops.fetch_failures, 1);

    // the next caller retries
    let record = ds.find("items", 5, FetchOptions::default()).await.unwrap();
    assert_eq!(record.value("id"), &Value::Int(5));
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn completed_lookups_are_served_locally_until_bypassed() {
    let adapter = Arc::new(MockAdapter::with_rows([json!({ "id": 1, "v": 1 })]));
    let ds = data_store(&adapter, CollectionConfig::new());

    ds.find("items", 1, FetchOptions::default()).await.unwrap();
    ds.find("items", 1, FetchOptions::default()).await.unwrap();
    assert_eq!(adapter.calls(), 1);
    assert_eq!(ds.read().metrics_report().ops.cache_hits, 1);

    ds.find("items", 1, FetchOptions::bypass_cache()).await.unwrap();
    ds.find("items", 1, FetchOptions::force_refresh()).await.unwrap();
    assert_eq!(adapter.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn missing_records_surface_the_adapter_status() {
    let adapter = Arc::new(MockAdapter::with_rows([]));
    let ds = data_store(&adapter, CollectionConfig::new());

    let err = ds.find("items", 9, FetchOptions::default()).await.unwrap_err();

    assert!(matches!(
        err.detail,
        Some(ErrorDetail::Adapter(AdapterError { status: Some(404), .. }))
    ));
    assert!(ds.read().get("items", 9).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn unknown_collections_fail_before_any_fetch() {
    let adapter = Arc::new(MockAdapter::with_rows([]));
    let ds = data_store(&adapter, CollectionConfig::new());

    let err = ds.find("nope", 1, FetchOptions::default()).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::UnknownCollection);
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn find_all_completes_the_query() {
    let adapter = Arc::new(MockAdapter::with_rows([
        json!({ "id": 1, "age": 30 }),
        json!({ "id": 2, "age": 40 }),
        json!({ "id": 3, "age": 50 }),
    ]));
    let ds = data_store(&adapter, CollectionConfig::new());
    let query = Query::new();

    let fetched = ds.find_all("items", &query, FetchOptions::default()).await.unwrap();
    let cached = ds.find_all("items", &query, FetchOptions::default()).await.unwrap();

    assert_eq!(fetched.len(), 3);
    assert_eq!(fetched, cached);
    assert_eq!(adapter.calls(), 1);
    assert!(ds.read().is_completed("items", &QueryKey::from(&query)).unwrap());
}

// ----------------------------------------------------------------------
// persistence
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn create_save_and_destroy_go_through_the_adapter() {
    let adapter = Arc::new(MockAdapter::with_rows([]));
    let ds = data_store(&adapter, CollectionConfig::new());

    let created = ds
        .create("items", Record::from_json(json!({ "name": "new" })).unwrap())
        .await
        .unwrap();
    let id = created.value("id").as_int().unwrap();
    let handle = ds.read().get_handle("items", id).unwrap().unwrap();
    assert!(!ds.read().has_changes("items", handle).unwrap());

    ds.write()
        .update("items", handle, Record::from_json(json!({ "name": "renamed" })).unwrap())
        .unwrap();
    assert!(ds.read().has_changes("items", handle).unwrap());

    ds.save("items", id).await.unwrap();
    assert!(!ds.read().has_changes("items", handle).unwrap());
    assert!(ds.read().last_saved("items", handle).unwrap().is_some());
    assert_eq!(adapter.row(id).unwrap().value("name"), &Value::from("renamed"));

    let err = ds.save("items", 12_345).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RecordNotFound);

    ds.destroy("items", id).await.unwrap();
    assert!(adapter.row(id).is_none());
    assert!(ds.read().get("items", id).unwrap().is_none());

    let err = ds.destroy("items", id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RecordNotFound);
}

// ----------------------------------------------------------------------
// reaper
// ----------------------------------------------------------------------

fn clocked(
    adapter: &Arc<MockAdapter>,
    clock: &Arc<ManualClock>,
    config: CollectionConfig,
) -> DataStore {
    let mut store = Store::with_clock(clock.clone());
    store
        .define_collection(CollectionDef::new("items").with_config(config))
        .unwrap();
    store.define_collection(CollectionDef::new("plain")).unwrap();

    DataStore::new(store, Arc::clone(adapter))
}

fn expiring(action: ReapAction) -> CollectionConfig {
    CollectionConfig::new()
        .with_max_age(Duration::from_millis(100))
        .with_reap_interval(Duration::from_millis(50))
        .with_reap_action(action)
}

#[tokio::test(start_paused = true)]
async fn expired_records_invalidate_completed_list_queries() {
    let adapter = Arc::new(MockAdapter::with_rows([
        json!({ "id": 1, "v": 1 }),
        json!({ "id": 2, "v": 1 }),
    ]));
    let clock = Arc::new(ManualClock::new(0));
    let config = CollectionConfig::new().with_max_age(Duration::from_millis(100));
    let ds = clocked(&adapter, &clock, config);
    let query = Query::new();

    ds.find_all("items", &query, FetchOptions::default()).await.unwrap();
    ds.find_all("items", &query, FetchOptions::default()).await.unwrap();
    assert_eq!(adapter.calls(), 1);

    // inject marks the entries without dropping the records
    clock.set(1_000_000);
    let report = ds.reap("items").await.unwrap();
    assert_eq!(report.expired.len(), 2);
    let handle = ds.read().get_handle("items", 1).unwrap().unwrap();
    assert!(ds.read().is_expired("items", handle).unwrap());

    let records = ds.find_all("items", &query, FetchOptions::default()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(adapter.calls(), 2);
    assert!(!ds.read().is_expired("items", handle).unwrap());

    // refetched data is fresh again
    ds.find_all("items", &query, FetchOptions::default()).await.unwrap();
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn reaper_ejects_expired_records_in_the_background() {
    let adapter = Arc::new(MockAdapter::with_rows([]));
    let clock = Arc::new(ManualClock::new(1_000));
    let ds = clocked(&adapter, &clock, expiring(ReapAction::Eject));
    ds.write()
        .add_one("items", Record::from_json(json!({ "id": 1 })).unwrap())
        .unwrap();

    let reaper = ds.spawn_reaper();
    assert_eq!(reaper.len(), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(ds.read().get("items", 1).unwrap().is_some());

    clock.set(1_150);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(ds.read().get("items", 1).unwrap().is_none());

    reaper.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reaper_refreshes_through_the_adapter() {
    let adapter = Arc::new(MockAdapter::with_rows([json!({ "id": 1, "v": 2 })]));
    let clock = Arc::new(ManualClock::new(0));
    let ds = clocked(&adapter, &clock, expiring(ReapAction::Refresh));
    ds.write()
        .add_one("items", Record::from_json(json!({ "id": 1, "v": 1 })).unwrap())
        .unwrap();

    let reaper = ds.spawn_reaper();
    clock.set(200);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let v = ds.read().get("items", 1).unwrap().unwrap().value("v").clone();
    assert_eq!(v, Value::Int(2));
    assert_eq!(adapter.calls(), 1);

    drop(reaper);
}
