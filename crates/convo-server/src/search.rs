//! Out-of-band search indexing.

use async_trait::async_trait;
#[cfg(test)]
use tokio::sync::Mutex;

use convo_shared::Key;

/// Index maintenance runs after the store write has succeeded and never
/// fails the request.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn update(&self, key: &Key, document: serde_json::Value);

    async fn delete(&self, key: &Key);
}

/// Logs index operations instead of sending them anywhere.
#[derive(Debug, Default)]
pub struct LogSearch;

#[async_trait]
impl SearchIndex for LogSearch {
    async fn update(&self, key: &Key, document: serde_json::Value) {
        tracing::debug!(key = %key, fields = ?document.as_object().map(|o| o.len()), "search update");
    }

    async fn delete(&self, key: &Key) {
        tracing::debug!(key = %key, "search delete");
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOp {
    Update(Key),
    Delete(Key),
}

/// Records index operations for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSearch {
    ops: Mutex<Vec<IndexOp>>,
}

#[cfg(test)]
impl RecordingSearch {
    pub async fn ops(&self) -> Vec<IndexOp> {
        self.ops.lock().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl SearchIndex for RecordingSearch {
    async fn update(&self, key: &Key, _document: serde_json::Value) {
        self.ops.lock().await.push(IndexOp::Update(*key));
    }

    async fn delete(&self, key: &Key) {
        self.ops.lock().await.push(IndexOp::Delete(*key));
    }
}
