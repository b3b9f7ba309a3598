//! Asynchronous facade over a `Store`: every adapter call goes through a
//! single-flight table so concurrent requests for one query share one fetch.

use crate::{adapter::Adapter, reaper::ReaperHandle};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use relstore_core::{
    arena::Handle,
    collection::QueryKey,
    error::{AdapterError, Error},
    obs::MetricsEvent,
    query::Query,
    record::Record,
    store::{AddOptions, ReapReport, Store},
    value::Value,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

type Fetch = Shared<BoxFuture<'static, Result<Vec<Handle>, Error>>>;
type PendingKey = (String, QueryKey);

///
/// FetchOptions
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FetchOptions {
    /// Ignore the completed-query map for this call.
    pub bypass_cache: bool,

    /// Re-fetch even when the data is cached and fresh.
    pub force_refresh: bool,
}

impl FetchOptions {
    #[must_use]
    pub const fn bypass_cache() -> Self {
        Self {
            bypass_cache: true,
            force_refresh: false,
        }
    }

    #[must_use]
    pub const fn force_refresh() -> Self {
        Self {
            bypass_cache: false,
            force_refresh: true,
        }
    }

    const fn skips_cache(self) -> bool {
        self.bypass_cache || self.force_refresh
    }
}

struct Inner {
    store: RwLock<Store>,
    adapter: Arc<dyn Adapter>,
    pending: Mutex<HashMap<PendingKey, Fetch>>,
}

impl Inner {
    // Add fetched records as clean data and mark the query complete.
    fn ingest(
        &self,
        name: &str,
        key: &QueryKey,
        records: Vec<Record>,
    ) -> Result<Vec<Handle>, Error> {
        let mut store = self.store.write();
        let handles = store.add(name, records, AddOptions::default())?;
        store.mark_completed(name, key.clone())?;

        Ok(handles)
    }
}

///
/// DataStore
///
/// Cheap to clone; clones share the store, the adapter and the pending map.
///

#[derive(Clone)]
pub struct DataStore {
    inner: Arc<Inner>,
}

impl DataStore {
    pub fn new<A: Adapter>(store: Store, adapter: Arc<A>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: RwLock::new(store),
                adapter,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Shared access to the synchronous store.
    pub fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.store.read()
    }

    /// Exclusive access to the synchronous store. Do not hold the guard
    /// across an await.
    pub fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.inner.store.write()
    }

    /// Number of fetches currently in flight.
    #[must_use]
    pub fn pending_fetches(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Start one background reap loop per collection with an expiry policy.
    #[must_use]
    pub fn spawn_reaper(&self) -> ReaperHandle {
        ReaperHandle::spawn(self.clone())
    }

    // ------------------------------------------------------------------
    // Fetch
    // ------------------------------------------------------------------

    /// Point lookup: served from the store when the key was fetched before
    /// and has not expired, otherwise fetched through the adapter.
    pub async fn find(
        &self,
        name: &str,
        key: impl Into<Value>,
        opts: FetchOptions,
    ) -> Result<Record, Error> {
        let key = key.into();
        let query_key = QueryKey::Record(key.clone());
        if let Some(record) = self.cached_record(name, &key, &query_key, opts)? {
            return Ok(record);
        }

        let adapter = &self.inner.adapter;
        let fetch = self.single_flight(name, query_key, || {
            adapter
                .find(name, &key)
                .map(|result| result.map(|record| vec![record]))
                .boxed()
        });
        let handles = fetch.await?;

        let store = self.inner.store.read();
        handles
            .first()
            .and_then(|handle| store.record(name, *handle).ok())
            .cloned()
            .ok_or_else(|| Error::record_not_found(name, &key))
    }

    /// List query: a completed query is answered by the local query pipeline,
    /// otherwise the adapter's result set is added and returned.
    pub async fn find_all(
        &self,
        name: &str,
        query: &Query,
        opts: FetchOptions,
    ) -> Result<Vec<Record>, Error> {
        let query_key = QueryKey::from(query);
        if let Some(records) = self.cached_query(name, query, &query_key, opts)? {
            return Ok(records);
        }

        let adapter = &self.inner.adapter;
        let fetch = self.single_flight(name, query_key, || adapter.find_all(name, query));
        let handles = fetch.await?;

        let store = self.inner.store.read();
        Ok(handles
            .iter()
            .filter_map(|handle| store.record(name, *handle).ok())
            .cloned()
            .collect())
    }

    fn cached_record(
        &self,
        name: &str,
        key: &Value,
        query_key: &QueryKey,
        opts: FetchOptions,
    ) -> Result<Option<Record>, Error> {
        if opts.skips_cache() {
            self.inner.store.write().clear_completed(name, query_key)?;
            return Ok(None);
        }

        let store = self.inner.store.read();
        if !store.is_completed(name, query_key)? {
            return Ok(None);
        }
        let Some(handle) = store.get_handle(name, key.clone())? else {
            return Ok(None);
        };
        if store.is_expired(name, handle)? {
            return Ok(None);
        }

        store.record_metric(MetricsEvent::CacheHit { collection: name });
        debug!(collection = name, %key, "cache hit");

        Ok(store.record(name, handle).ok().cloned())
    }

    fn cached_query(
        &self,
        name: &str,
        query: &Query,
        query_key: &QueryKey,
        opts: FetchOptions,
    ) -> Result<Option<Vec<Record>>, Error> {
        if opts.skips_cache() {
            self.inner.store.write().clear_completed(name, query_key)?;
            return Ok(None);
        }

        let store = self.inner.store.read();
        if !store.is_completed(name, query_key)? {
            return Ok(None);
        }

        let handles = store.filter(name, query)?;
        for handle in &handles {
            if store.is_expired(name, *handle)? {
                debug!(collection = name, %handle, "completed query holds expired records");
                return Ok(None);
            }
        }
        store.record_metric(MetricsEvent::CacheHit { collection: name });

        Ok(Some(
            store
                .records(name, &handles)?
                .into_iter()
                .cloned()
                .collect(),
        ))
    }

    // Join the in-flight fetch for `key`, or start one. The fetch is driven by
    // its own task and leaves the pending map when it settles, success or not.
    fn single_flight<F>(&self, name: &str, key: QueryKey, start: F) -> Fetch
    where
        F: FnOnce() -> BoxFuture<'static, Result<Vec<Record>, AdapterError>>,
    {
        let pending_key = (name.to_string(), key);
        let mut pending = self.inner.pending.lock();

        if let Some(fetch) = pending.get(&pending_key) {
            self.inner
                .store
                .read()
                .record_metric(MetricsEvent::FetchJoined { collection: name });
            debug!(collection = name, key = ?pending_key.1, "joined pending fetch");
            return fetch.clone();
        }

        let request = start();
        let inner = Arc::clone(&self.inner);
        let settle_key = pending_key.clone();
        let fetch = async move {
            let (name, key) = &settle_key;
            let result = match request.await {
                Ok(records) => inner.ingest(name, key, records),
                Err(err) => Err(Error::from(err)),
            };

            inner.pending.lock().remove(&settle_key);
            if let Err(err) = &result {
                inner
                    .store
                    .read()
                    .record_metric(MetricsEvent::FetchFailed { collection: name });
                warn!(collection = %name, error = %err, "fetch failed");
            }

            result
        }
        .boxed()
        .shared();

        pending.insert(pending_key, fetch.clone());
        tokio::spawn(fetch.clone().map(drop));

        self.inner
            .store
            .read()
            .record_metric(MetricsEvent::FetchStarted { collection: name });
        debug!(collection = name, "fetch started");

        fetch
    }

    // ------------------------------------------------------------------
    // Persist
    // ------------------------------------------------------------------

    /// Create through the adapter, then add the stored form as clean data.
    pub async fn create(&self, name: &str, record: Record) -> Result<Record, Error> {
        self.inner.store.read().collection(name)?;

        let created = self.inner.adapter.create(name, record).await?;

        let mut store = self.inner.store.write();
        let handle = store.add_one(name, created)?;
        store.commit(name, handle)?;

        Ok(store.record(name, handle)?.clone())
    }

    /// Push the tracked record with `key` to the adapter and acknowledge the
    /// save. Fails with `RecordNotFound` when no such record is stored.
    pub async fn save(&self, name: &str, key: impl Into<Value>) -> Result<Record, Error> {
        let key = key.into();
        let record = self
            .inner
            .store
            .read()
            .get(name, key.clone())?
            .cloned()
            .ok_or_else(|| Error::record_not_found(name, &key))?;

        let saved = self.inner.adapter.update(name, record).await?;

        let mut store = self.inner.store.write();
        let handle = store.add_one(name, saved)?;
        store.commit(name, handle)?;

        Ok(store.record(name, handle)?.clone())
    }

    /// Destroy through the adapter, then remove locally.
    pub async fn destroy(&self, name: &str, key: impl Into<Value>) -> Result<Record, Error> {
        let key = key.into();
        if self
            .inner
            .store
            .read()
            .get_handle(name, key.clone())?
            .is_none()
        {
            return Err(Error::record_not_found(name, &key));
        }

        self.inner.adapter.destroy(name, key.clone()).await?;

        self.inner
            .store
            .write()
            .remove(name, key.clone())?
            .ok_or_else(|| Error::record_not_found(name, &key))
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    /// Reap one collection and re-fetch every record with a `refresh`
    /// disposition. Refresh failures are logged; the record stays as it was.
    pub async fn reap(&self, name: &str) -> Result<ReapReport, Error> {
        let report = self.inner.store.write().reap(name)?;

        for key in &report.refresh {
            if let Err(err) = self.find(name, key.clone(), FetchOptions::force_refresh()).await {
                warn!(collection = name, %key, error = %err, "refresh failed");
            }
        }

        Ok(report)
    }
}
