use futures::future::BoxFuture;
use relstore_core::{error::AdapterError, query::Query, record::Record, value::Value};

///
/// Adapter
///
/// Backing source behind a `DataStore`: a network API, a database, a file.
/// Every call returns an owned future so it can be driven independently of
/// the caller and shared between concurrent requests.
///

pub trait Adapter: Send + Sync + 'static {
    /// Fetch one record by key. A missing record is an error (typically
    /// carrying status 404).
    fn find(
        &self,
        collection: &str,
        key: &Value,
    ) -> BoxFuture<'static, Result<Record, AdapterError>>;

    fn find_all(
        &self,
        collection: &str,
        query: &Query,
    ) -> BoxFuture<'static, Result<Vec<Record>, AdapterError>>;

    /// Persist a new record; returns it as stored, including any assigned key.
    fn create(
        &self,
        collection: &str,
        record: Record,
    ) -> BoxFuture<'static, Result<Record, AdapterError>>;

    fn update(
        &self,
        collection: &str,
        record: Record,
    ) -> BoxFuture<'static, Result<Record, AdapterError>>;

    fn destroy(&self, collection: &str, key: Value) -> BoxFuture<'static, Result<(), AdapterError>>;
}
