//! In-process [`Datastore`] used by tests and local development.
//!
//! Every document carries a version number bumped on each write so that
//! [`MemoryTransaction`] can detect lost updates at commit time. Call
//! counters let tests assert how many round trips an operation made.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use convo_shared::Key;

use crate::datastore::{Datastore, Direction, Query, Transaction};
use crate::error::{Result, StoreError};

#[derive(Default)]
struct Inner {
    docs: HashMap<Key, (u64, Value)>,
    clock: u64,
}

impl Inner {
    fn write(&mut self, key: Key, doc: Value) {
        self.clock += 1;
        self.docs.insert(key, (self.clock, doc));
    }

    fn version(&self, key: &Key) -> Option<u64> {
        self.docs.get(key).map(|(v, _)| *v)
    }
}

#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    get_multis: AtomicUsize,
    puts: AtomicUsize,
    put_multis: AtomicUsize,
    deletes: AtomicUsize,
    queries: AtomicUsize,
    commits: AtomicUsize,
}

/// Snapshot of the round trips made against a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub gets: usize,
    pub get_multis: usize,
    pub puts: usize,
    pub put_multis: usize,
    pub deletes: usize,
    pub queries: usize,
    pub commits: usize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CallStats {
        let c = &self.counters;
        CallStats {
            gets: c.gets.load(AtomicOrdering::Relaxed),
            get_multis: c.get_multis.load(AtomicOrdering::Relaxed),
            puts: c.puts.load(AtomicOrdering::Relaxed),
            put_multis: c.put_multis.load(AtomicOrdering::Relaxed),
            deletes: c.deletes.load(AtomicOrdering::Relaxed),
            queries: c.queries.load(AtomicOrdering::Relaxed),
            commits: c.commits.load(AtomicOrdering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        let c = &self.counters;
        for counter in [
            &c.gets,
            &c.get_multis,
            &c.puts,
            &c.put_multis,
            &c.deletes,
            &c.queries,
            &c.commits,
        ] {
            counter.store(0, AtomicOrdering::Relaxed);
        }
    }

    /// Every stored document, sorted by key. Used to compare whole-store
    /// states in tests.
    pub async fn dump(&self) -> Vec<(Key, Value)> {
        let inner = self.inner.read().await;
        let mut docs: Vec<(Key, Value)> = inner
            .docs
            .iter()
            .map(|(k, (_, doc))| (*k, doc.clone()))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        docs
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn run_query(inner: &Inner, query: &Query) -> Vec<(Key, Value)> {
        let mut hits: Vec<(Key, Value)> = inner
            .docs
            .iter()
            .filter(|(k, _)| k.kind() == query.kind)
            .filter(|(_, (_, doc))| {
                query
                    .filters
                    .iter()
                    .all(|(field, value)| resolve(doc, field).iter().any(|v| *v == value))
            })
            .map(|(k, (_, doc))| (*k, doc.clone()))
            .collect();

        // Stable base order so offset/limit are deterministic.
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some((field, direction)) = &query.order {
            hits.sort_by(|a, b| {
                let ord = compare(
                    resolve(&a.1, field).first().copied(),
                    resolve(&b.1, field).first().copied(),
                );
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        hits.into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Values found at a dotted path, with arrays flattened at every step.
fn resolve<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            if let Some(field) = value.get(segment) {
                match field {
                    Value::Array(items) => next.extend(items.iter()),
                    other => next.push(other),
                }
            }
        }
        current = next;
    }
    current
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            // Timestamps compare chronologically, not lexically.
            match (
                x.parse::<DateTime<Utc>>().ok(),
                y.parse::<DateTime<Utc>>().ok(),
            ) {
                (Some(tx), Some(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn ensure_object(key: &Key, doc: &Value) -> Result<()> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(StoreError::MalformedDocument(*key))
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Self::bump(&self.counters.gets);
        let inner = self.inner.read().await;
        Ok(inner.docs.get(key).map(|(_, doc)| doc.clone()))
    }

    async fn get_multi(&self, keys: &[Key]) -> Result<Vec<Option<Value>>> {
        Self::bump(&self.counters.get_multis);
        let inner = self.inner.read().await;
        Ok(keys
            .iter()
            .map(|k| inner.docs.get(k).map(|(_, doc)| doc.clone()))
            .collect())
    }

    async fn put(&self, key: &Key, doc: Value) -> Result<()> {
        Self::bump(&self.counters.puts);
        ensure_object(key, &doc)?;
        self.inner.write().await.write(*key, doc);
        Ok(())
    }

    async fn put_multi(&self, docs: Vec<(Key, Value)>) -> Result<()> {
        Self::bump(&self.counters.put_multis);
        for (key, doc) in &docs {
            ensure_object(key, doc)?;
        }
        let mut inner = self.inner.write().await;
        for (key, doc) in docs {
            inner.write(key, doc);
        }
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        Self::bump(&self.counters.deletes);
        self.inner.write().await.docs.remove(key);
        Ok(())
    }

    async fn delete_multi(&self, keys: &[Key]) -> Result<()> {
        Self::bump(&self.counters.deletes);
        let mut inner = self.inner.write().await;
        for key in keys {
            inner.docs.remove(key);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<(Key, Value)>> {
        Self::bump(&self.counters.queries);
        let inner = self.inner.read().await;
        Ok(Self::run_query(&inner, query))
    }

    async fn query_keys(&self, query: &Query) -> Result<Vec<Key>> {
        Self::bump(&self.counters.queries);
        let inner = self.inner.read().await;
        Ok(Self::run_query(&inner, query)
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            counters: Arc::clone(&self.counters),
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

pub struct MemoryTransaction {
    inner: Arc<RwLock<Inner>>,
    counters: Arc<Counters>,
    reads: HashMap<Key, Option<u64>>,
    writes: Vec<(Key, Option<Value>)>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, key: &Key) -> Result<Option<Value>> {
        let inner = self.inner.read().await;
        let entry = inner.docs.get(key);
        self.reads.entry(*key).or_insert(entry.map(|(v, _)| *v));
        Ok(entry.map(|(_, doc)| doc.clone()))
    }

    fn put(&mut self, key: &Key, doc: Value) {
        self.writes.push((*key, Some(doc)));
    }

    fn delete(&mut self, key: &Key) {
        self.writes.push((*key, None));
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            inner,
            counters,
            reads,
            writes,
        } = *self;
        MemoryStore::bump(&counters.commits);
        for (key, doc) in &writes {
            if let Some(doc) = doc {
                ensure_object(key, doc)?;
            }
        }

        let mut inner = inner.write().await;
        for (key, seen) in &reads {
            if inner.version(key) != *seen {
                tracing::debug!(key = %key, "transaction conflict");
                return Err(StoreError::Conflict(*key));
            }
        }
        for (key, doc) in writes {
            match doc {
                Some(doc) => inner.write(key, doc),
                None => {
                    inner.docs.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_shared::Kind;
    use serde_json::json;

    fn key(kind: Kind, id: i64) -> Key {
        Key::new(kind, id)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        let k = key(Kind::User, 1);
        store.put(&k, json!({"Email": "a@b.co"})).await.unwrap();
        assert_eq!(
            store.get(&k).await.unwrap(),
            Some(json!({"Email": "a@b.co"}))
        );
        store.delete(&k).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_non_object() {
        let store = MemoryStore::new();
        let err = store.put(&key(Kind::User, 1), json!([1, 2])).await;
        assert!(matches!(err, Err(StoreError::MalformedDocument(_))));
    }

    #[tokio::test]
    async fn test_get_multi_keeps_slots() {
        let store = MemoryStore::new();
        store.put(&key(Kind::User, 2), json!({"N": 2})).await.unwrap();
        let docs = store
            .get_multi(&[key(Kind::User, 1), key(Kind::User, 2)])
            .await
            .unwrap();
        assert_eq!(docs, vec![None, Some(json!({"N": 2}))]);
    }

    #[tokio::test]
    async fn test_query_array_and_nested_filters() {
        let store = MemoryStore::new();
        let alice = key(Kind::User, 1).encode();
        let bob = key(Kind::User, 2).encode();
        store
            .put(
                &key(Kind::Thread, 10),
                json!({"UserKeys": [alice, bob], "Reads": [{"UserKey": bob}]}),
            )
            .await
            .unwrap();
        store
            .put(&key(Kind::Thread, 11), json!({"UserKeys": [bob], "Reads": []}))
            .await
            .unwrap();
        store
            .put(&key(Kind::Event, 12), json!({"UserKeys": [alice]}))
            .await
            .unwrap();

        let q = Query::new(Kind::Thread).filter("UserKeys", &alice);
        assert_eq!(
            store.query_keys(&q).await.unwrap(),
            vec![key(Kind::Thread, 10)]
        );

        let q = Query::new(Kind::Thread).filter("Reads.UserKey", &bob);
        assert_eq!(
            store.query_keys(&q).await.unwrap(),
            vec![key(Kind::Thread, 10)]
        );
    }

    #[tokio::test]
    async fn test_query_orders_timestamps_chronologically() {
        let store = MemoryStore::new();
        store
            .put(&key(Kind::Message, 1), json!({"Timestamp": "2024-01-01T00:00:00Z"}))
            .await
            .unwrap();
        store
            .put(
                &key(Kind::Message, 2),
                json!({"Timestamp": "2024-01-01T00:00:00.500Z"}),
            )
            .await
            .unwrap();

        let q = Query::new(Kind::Message)
            .order("Timestamp", Direction::Desc)
            .limit(Some(1));
        assert_eq!(
            store.query_keys(&q).await.unwrap(),
            vec![key(Kind::Message, 2)]
        );
    }

    #[tokio::test]
    async fn test_transaction_conflict() {
        let store = MemoryStore::new();
        let k = key(Kind::Event, 1);
        store.put(&k, json!({"RsvpKeys": []})).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.get(&k).await.unwrap();
        tx.put(&k, json!({"RsvpKeys": ["a"]}));

        // A concurrent writer lands first.
        store.put(&k, json!({"RsvpKeys": ["b"]})).await.unwrap();

        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(store.get(&k).await.unwrap(), Some(json!({"RsvpKeys": ["b"]})));
    }

    #[tokio::test]
    async fn test_transaction_commit() {
        let store = MemoryStore::new();
        let k = key(Kind::Event, 1);
        store.put(&k, json!({"RsvpKeys": []})).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.get(&k).await.unwrap();
        tx.put(&k, json!({"RsvpKeys": ["a"]}));
        tx.commit().await.unwrap();

        assert_eq!(store.get(&k).await.unwrap(), Some(json!({"RsvpKeys": ["a"]})));
        assert_eq!(store.stats().commits, 1);
    }
}
