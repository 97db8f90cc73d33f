//! Persistence for [`Message`] records and the thread/event posting flows.

use std::collections::HashMap;

use convo_shared::{key, Key, Kind, OpContext, Pagination, Result};

use crate::database::Database;
use crate::datastore::{Direction, Query};
use crate::models::{Event, Message, Readable, Thread, User, UserPartial};

impl Database {
    /// Persist a message. Always written with the current field names.
    pub async fn commit_message(&self, message: &Message) -> Result<()> {
        self.put(message).await.op("messages.commit")
    }

    /// Post to a thread: persists the message and the updated thread.
    pub async fn add_thread_message(
        &self,
        author: &User,
        thread: &mut Thread,
        body: &str,
    ) -> Result<Message> {
        let message = Message::new_thread_message(author, thread, body).op("messages.thread")?;
        self.commit_message(&message).await?;
        self.put(thread).await.op("messages.thread")?;
        tracing::debug!(thread = %thread.key, message = %message.key, "thread message added");
        Ok(message)
    }

    /// Post to an event: persists the message and the updated event.
    pub async fn add_event_message(
        &self,
        author: &User,
        event: &mut Event,
        body: &str,
    ) -> Result<Message> {
        let message = Message::new_event_message(author, event, body).op("messages.event")?;
        self.commit_message(&message).await?;
        self.put(event).await.op("messages.event")?;
        tracing::debug!(event = %event.key, message = %message.key, "event message added");
        Ok(message)
    }

    /// Every message under `parent`, newest first, with author snapshots.
    pub async fn get_messages_by_parent(&self, parent: &Key) -> Result<Vec<Message>> {
        self.get_messages_by_parent_paged(parent, Pagination::unlimited())
            .await
    }

    pub async fn get_messages_by_parent_paged(
        &self,
        parent: &Key,
        page: Pagination,
    ) -> Result<Vec<Message>> {
        let query = Query::new(Kind::Message)
            .filter("ParentKey", parent)
            .order("Timestamp", Direction::Desc)
            .offset(page.offset())
            .limit(page.limit());
        let mut messages: Vec<Message> = self.query(&query).await.op("messages.by_parent")?;
        self.attach_authors(&mut messages)
            .await
            .op("messages.by_parent")?;
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(messages)
    }

    /// One bulk fetch of the distinct authors.
    async fn attach_authors(&self, messages: &mut [Message]) -> Result<()> {
        let authors: Vec<Key> = key::dedupe(&messages.iter().map(|m| m.user_key).collect::<Vec<_>>());
        if authors.is_empty() {
            return Ok(());
        }
        let snapshots: HashMap<Key, UserPartial> = self
            .get_user_partials(&authors)
            .await?
            .into_iter()
            .map(|p| (p.key, p))
            .collect();
        for message in messages.iter_mut() {
            message.user = snapshots.get(&message.user_key).cloned();
        }
        Ok(())
    }

    /// Mark `messages` read by `user` and write back the ones that changed
    /// in one bulk put.
    pub async fn mark_messages_read(&self, messages: &mut [Message], user: &Key) -> Result<usize> {
        let mut changed = Vec::new();
        for message in messages.iter_mut() {
            if message.mark_as_read(user) {
                changed.push(message.clone());
            }
        }
        self.put_multi(&changed).await.op("messages.mark_read")?;
        Ok(changed.len())
    }

    /// Rewrite documents that still use the legacy `ThreadKey` field.
    pub async fn normalize_legacy_messages(&self) -> Result<usize> {
        let docs = self
            .store()
            .query(&Query::new(Kind::Message))
            .await
            .op("messages.normalize")?;
        let mut rewritten = Vec::new();
        for (k, doc) in docs {
            if doc.get("ThreadKey").is_some() {
                let message: Message = crate::database::decode(&k, doc).op("messages.normalize")?;
                rewritten.push(message);
            }
        }
        self.put_multi(&rewritten).await.op("messages.normalize")?;
        if !rewritten.is_empty() {
            tracing::info!(count = rewritten.len(), "normalized legacy messages");
        }
        Ok(rewritten.len())
    }
}
