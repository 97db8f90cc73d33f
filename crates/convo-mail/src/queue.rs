//! Deferred email jobs.
//!
//! Handlers enqueue `{kind, action, ids}` and return immediately; a worker
//! in the server drains the queue through `Postman::process_job`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{MailError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Thread,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobAction {
    SendThread,
    SendInvites,
    SendUpdatedInvites,
    SendInviteToUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub action: JobAction,
    /// Encoded handles, primary entity first.
    pub ids: Vec<String>,
}

impl EmailJob {
    pub fn new(kind: JobKind, action: JobAction, ids: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            action,
            ids,
        }
    }
}

#[async_trait]
pub trait EmailQueue: Send + Sync {
    async fn enqueue(&self, job: EmailJob) -> Result<()>;
}

/// In-process queue over an unbounded tokio channel.
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<EmailJob>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<EmailJob>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// The receiving end, handed out once to the worker.
    pub async fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<EmailJob>> {
        self.rx.lock().await.take()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailQueue for MemoryQueue {
    async fn enqueue(&self, job: EmailJob) -> Result<()> {
        tracing::debug!(job = %job.id, kind = ?job.kind, action = ?job.action, "email job queued");
        self.tx
            .send(job)
            .map_err(|_| MailError::Queue("email queue is closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_receive() {
        let queue = MemoryQueue::new();
        let mut rx = queue.take_receiver().await.unwrap();
        assert!(queue.take_receiver().await.is_none());

        let job = EmailJob::new(JobKind::Event, JobAction::SendInvites, vec!["abc".into()]);
        queue.enqueue(job.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), job);
    }

    #[tokio::test]
    async fn test_closed_queue_errors() {
        let queue = MemoryQueue::new();
        drop(queue.take_receiver().await);
        let job = EmailJob::new(JobKind::Thread, JobAction::SendThread, vec![]);
        assert!(matches!(queue.enqueue(job).await, Err(MailError::Queue(_))));
    }

    #[test]
    fn test_job_wire_format() {
        let job = EmailJob::new(JobKind::Event, JobAction::SendInviteToUser, vec!["e".into(), "u".into()]);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["kind"], "event");
        assert_eq!(json["action"], "sendInviteToUser");
        assert_eq!(json["ids"][1], "u");
    }
}
