//! Typed façade over a [`Datastore`].
//!
//! [`Database`] is cheap to clone and is shared by every request handler.
//! Entity modules (`users`, `threads`, `events`, `messages`) add their
//! operations as further `impl Database` blocks.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use convo_shared::{ConvoError, Key, Kind, Result};

use crate::datastore::{Datastore, Query, Transaction};
use crate::memory::MemoryStore;

/// A document type stored under its own [`Kind`].
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: Kind;

    fn key(&self) -> &Key;

    /// Human-readable label used in "not found" messages.
    fn label() -> &'static str {
        Self::KIND.as_str()
    }
}

pub(crate) fn encode<T: Entity>(entity: &T) -> Result<(Key, Value)> {
    Ok((*entity.key(), serde_json::to_value(entity)?))
}

pub(crate) fn decode<T: Entity>(key: &Key, doc: Value) -> Result<T> {
    serde_json::from_value(doc)
        .map_err(|e| ConvoError::Internal(format!("decoding {} {}: {}", T::label(), key, e)))
}

#[derive(Clone)]
pub struct Database {
    store: Arc<dyn Datastore>,
}

impl Database {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Database backed by a fresh [`MemoryStore`].
    pub fn memory() -> (Self, MemoryStore) {
        let store = MemoryStore::new();
        (Self::new(Arc::new(store.clone())), store)
    }

    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get<T: Entity>(&self, key: &Key) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(doc) => Ok(Some(decode(key, doc)?)),
            None => Ok(None),
        }
    }

    /// Like [`Database::get`] but a missing document is `NotFound`.
    pub async fn fetch<T: Entity>(&self, key: &Key) -> Result<T> {
        if key.kind() != T::KIND {
            return Err(ConvoError::NotFound(format!("{} not found", T::label())));
        }
        self.get(key)
            .await?
            .ok_or_else(|| ConvoError::NotFound(format!("{} not found", T::label())))
    }

    /// One slot per key; missing documents are `None`.
    pub async fn get_multi<T: Entity>(&self, keys: &[Key]) -> Result<Vec<Option<T>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.store.get_multi(keys).await?;
        keys.iter()
            .zip(docs)
            .map(|(key, doc)| doc.map(|d| decode(key, d)).transpose())
            .collect()
    }

    pub async fn query<T: Entity>(&self, query: &Query) -> Result<Vec<T>> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|(key, doc)| decode(&key, doc))
            .collect()
    }

    pub async fn query_keys(&self, query: &Query) -> Result<Vec<Key>> {
        Ok(self.store.query_keys(query).await?)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn put<T: Entity>(&self, entity: &T) -> Result<()> {
        let (key, doc) = encode(entity)?;
        self.store.put(&key, doc).await?;
        Ok(())
    }

    pub async fn put_multi<T: Entity>(&self, entities: &[T]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let docs = entities.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.store.put_multi(docs).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &Key) -> Result<()> {
        self.store.delete(key).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Tx> {
        Ok(Tx {
            inner: self.store.begin().await?,
        })
    }
}

/// Typed wrapper over a store [`Transaction`].
pub struct Tx {
    inner: Box<dyn Transaction>,
}

impl Tx {
    pub async fn fetch<T: Entity>(&mut self, key: &Key) -> Result<T> {
        match self.inner.get(key).await? {
            Some(doc) => decode(key, doc),
            None => Err(ConvoError::NotFound(format!("{} not found", T::label()))),
        }
    }

    pub fn put<T: Entity>(&mut self, entity: &T) -> Result<()> {
        let (key, doc) = encode(entity)?;
        self.inner.put(&key, doc);
        Ok(())
    }

    pub fn delete(&mut self, key: &Key) {
        self.inner.delete(key);
    }

    /// A lost race surfaces as `Conflict`; callers may retry.
    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await.map_err(|e| match e {
            crate::StoreError::Conflict(key) => {
                ConvoError::Conflict(format!("{} was modified concurrently", key.kind()))
            }
            other => other.into(),
        })
    }
}
