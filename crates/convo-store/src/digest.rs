//! Per-user digests of unread messages.

use convo_shared::{Key, OpContext, Result};

use crate::database::Database;
use crate::models::{Event, Message, Readable, Thread, User};

/// A parent whose messages can be summarized in a digest.
pub trait Digestable: Readable + Send + Sync {
    fn digest_key(&self) -> &Key;

    fn digest_name(&self) -> &str;
}

impl Digestable for Thread {
    fn digest_key(&self) -> &Key {
        &self.key
    }

    fn digest_name(&self) -> &str {
        &self.subject
    }
}

impl Digestable for Event {
    fn digest_key(&self) -> &Key {
        &self.key
    }

    fn digest_name(&self) -> &str {
        &self.name
    }
}

/// Unread messages under one parent, newest first.
#[derive(Debug, Clone)]
pub struct DigestItem {
    pub parent: Key,
    pub name: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default)]
pub struct Digest {
    pub items: Vec<DigestItem>,
    /// Events starting soon, listed regardless of read state.
    pub upcoming: Vec<Event>,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.upcoming.is_empty()
    }
}

impl Database {
    /// Collect, per digestable, the messages `user` has not read. Parents
    /// with nothing unread are skipped.
    pub async fn generate_digest(
        &self,
        digestables: &[&dyn Digestable],
        user: &Key,
    ) -> Result<Vec<DigestItem>> {
        let mut items = Vec::new();
        for d in digestables {
            let unread: Vec<Message> = self
                .get_messages_by_parent(d.digest_key())
                .await
                .op("digest.generate")?
                .into_iter()
                .filter(|m| !m.is_read(user))
                .collect();
            if !unread.is_empty() {
                items.push(DigestItem {
                    parent: *d.digest_key(),
                    name: d.digest_name().to_string(),
                    messages: unread,
                });
            }
        }
        Ok(items)
    }

    /// Mark every digested message read by `user` in a single bulk write.
    pub async fn mark_digested_as_read(&self, items: &mut [DigestItem], user: &Key) -> Result<()> {
        let mut messages: Vec<Message> = items
            .iter_mut()
            .flat_map(|item| std::mem::take(&mut item.messages))
            .collect();
        self.mark_messages_read(&mut messages, user)
            .await
            .op("digest.mark_read")?;

        // Hand the updated messages back to their items.
        for message in messages {
            if let Some(item) = items.iter_mut().find(|i| i.parent == message.parent_key) {
                item.messages.push(message);
            }
        }
        Ok(())
    }

    /// Digest for `user` across every thread and event they can see whose
    /// parent they have not read, plus their upcoming events.
    pub async fn digest_for_user(&self, user: &User) -> Result<Digest> {
        let threads = self.get_threads_by_user(user).await.op("digest.user")?;
        let events = self.get_events_by_user(user).await.op("digest.user")?;

        let mut digestables: Vec<&dyn Digestable> = Vec::new();
        for thread in threads.iter().filter(|t| !t.is_read(&user.key)) {
            digestables.push(thread);
        }
        for event in events.iter().filter(|e| !e.is_read(&user.key)) {
            digestables.push(event);
        }

        let items = self.generate_digest(&digestables, &user.key).await?;
        let upcoming = events.iter().filter(|e| e.is_upcoming()).cloned().collect();
        Ok(Digest { items, upcoming })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDraft, Place};
    use chrono::{Duration, Utc};

    async fn user(db: &Database, first: &str) -> User {
        let u = User::invited(&format!("{}@example.com", first.to_lowercase()), first, "D").unwrap();
        db.create_user(&u).await.unwrap();
        u
    }

    #[tokio::test]
    async fn test_digest_then_mark_read_is_empty() {
        let (db, store) = Database::memory();
        let alice = user(&db, "Alice").await;
        let bob = user(&db, "Bob").await;

        let mut busy = db.create_thread("Busy", &alice, &[bob.clone()]).await.unwrap();
        db.add_thread_message(&alice, &mut busy, "one").await.unwrap();
        db.add_thread_message(&alice, &mut busy, "two").await.unwrap();
        let quiet = db.create_thread("Quiet", &alice, &[bob.clone()]).await.unwrap();

        let mut items = db
            .generate_digest(&[&busy, &quiet], &bob.key)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Busy");
        assert_eq!(items[0].messages.len(), 2);

        // The author already read their own messages.
        assert!(db
            .generate_digest(&[&busy], &alice.key)
            .await
            .unwrap()
            .is_empty());

        store.reset_stats();
        db.mark_digested_as_read(&mut items, &bob.key).await.unwrap();
        assert_eq!(store.stats().put_multis, 1);
        assert_eq!(items[0].messages.len(), 2);

        let again = db
            .generate_digest(&[&busy, &quiet], &bob.key)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_digest_for_user_includes_upcoming_events() {
        let (db, _) = Database::memory();
        let alice = user(&db, "Alice").await;
        let bob = user(&db, "Bob").await;

        let mut soon = Event::new(
            EventDraft {
                name: "Brunch".into(),
                description: String::new(),
                place: Place::default(),
                timestamp: Utc::now() + Duration::hours(12),
                utc_offset: 0,
                guests_can_invite: false,
            },
            &alice,
            &[],
            &[bob.clone()],
        )
        .unwrap();
        db.create_event(&soon).await.unwrap();
        db.add_event_message(&alice, &mut soon, "Bring juice").await.unwrap();

        let mut read_thread = db.create_thread("Seen", &alice, &[bob.clone()]).await.unwrap();
        db.add_thread_message(&alice, &mut read_thread, "old news").await.unwrap();
        db.mark_thread_read(&mut read_thread, &bob.key).await.unwrap();

        let bob = db.get_user(&bob.key).await.unwrap();
        let digest = db.digest_for_user(&bob).await.unwrap();
        assert_eq!(digest.items.len(), 1);
        assert_eq!(digest.items[0].parent, soon.key);
        assert_eq!(digest.upcoming.len(), 1);
        assert!(!digest.is_empty());
    }
}
