//! Document-store abstraction.
//!
//! Documents are JSON objects addressed by [`Key`]. The trait mirrors the
//! hosted document database the service runs against: point reads, bulk
//! reads and writes, equality queries over scalar or array-valued
//! properties, and optimistic transactions.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use convo_shared::{Key, Kind};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Equality filters, one optional ordering, offset and limit.
///
/// A filter on an array-valued property matches when any element equals
/// the value. Dotted paths (`Reads.UserKey`) descend into nested objects,
/// flattening arrays along the way.
#[derive(Debug, Clone)]
pub struct Query {
    pub kind: Kind,
    pub filters: Vec<(String, Value)>,
    pub order: Option<(String, Direction)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            filters: Vec::new(),
            order: None,
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(mut self, field: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.filters.push((field.to_string(), value));
        self
    }

    pub fn order(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
pub trait Datastore: Send + Sync {
    async fn get(&self, key: &Key) -> Result<Option<Value>>;

    /// One slot per requested key, `None` where the document is missing.
    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Option<Value>>>;

    async fn put(&self, key: &Key, doc: Value) -> Result<()>;

    async fn put_multi(&self, docs: Vec<(Key, Value)>) -> Result<()>;

    async fn delete(&self, key: &Key) -> Result<()>;

    async fn delete_multi(&self, keys: &[Key]) -> Result<()>;

    async fn query(&self, query: &Query) -> Result<Vec<(Key, Value)>>;

    async fn query_keys(&self, query: &Query) -> Result<Vec<Key>>;

    /// Start an optimistic transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// Reads inside a transaction are tracked; `commit` fails with
/// `StoreError::Conflict` if any of them changed before the writes land.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, key: &Key) -> Result<Option<Value>>;

    fn put(&mut self, key: &Key, doc: Value);

    fn delete(&mut self, key: &Key);

    async fn commit(self: Box<Self>) -> Result<()>;
}
