use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use convo_shared::{ConvoError, Key, Kind, Result};

use super::event::Event;
use super::readable::{Read, Readable};
use super::thread::Thread;
use super::user::{User, UserPartial};
use crate::database::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub key: Key,
    /// Author.
    pub user_key: Key,
    /// Thread or event the message belongs to. Older documents call this
    /// `ThreadKey`; it is always written back as `ParentKey`.
    #[serde(alias = "ThreadKey")]
    pub parent_key: Key,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reads: Vec<Read>,

    #[serde(skip)]
    pub user: Option<UserPartial>,
}

impl Entity for Message {
    const KIND: Kind = Kind::Message;

    fn key(&self) -> &Key {
        &self.key
    }
}

impl Readable for Message {
    fn reads(&self) -> &[Read] {
        &self.reads
    }

    fn reads_mut(&mut self) -> &mut Vec<Read> {
        &mut self.reads
    }
}

fn build(author: &User, parent: Key, body: &str) -> Result<Message> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ConvoError::invalid("message", "This field is required"));
    }
    let mut message = Message {
        key: Key::generate(Kind::Message),
        user_key: author.key,
        parent_key: parent,
        body: body.to_string(),
        timestamp: Utc::now(),
        reads: Vec::new(),
        user: Some(author.snapshot()),
    };
    message.mark_as_read(&author.key);
    Ok(message)
}

impl Message {
    /// Append to `thread`: the preview follows the new message and only
    /// the author is left having read the thread.
    pub fn new_thread_message(author: &User, thread: &mut Thread, body: &str) -> Result<Self> {
        if !thread.has_user(&author.key) {
            return Err(ConvoError::Forbidden(
                "You are not a member of this thread".into(),
            ));
        }
        let message = build(author, thread.key, body)?;
        thread.set_preview(&message.body, author.snapshot(), message.timestamp);
        thread.clear_reads();
        thread.mark_as_read(&author.key);
        Ok(message)
    }

    pub fn new_event_message(author: &User, event: &mut Event, body: &str) -> Result<Self> {
        if !event.has_user(&author.key) {
            return Err(ConvoError::Forbidden(
                "You are not invited to this event".into(),
            ));
        }
        let message = build(author, event.key, body)?;
        event.clear_reads();
        event.mark_as_read(&author.key);
        Ok(message)
    }

    pub fn has_user(&self, user: &Key) -> bool {
        self.user_key == *user
    }

    pub fn swap_user(&mut self, old: &Key, new: &Key) {
        if self.user_key == *old {
            self.user_key = *new;
        }
        self.swap_reads(old, new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EventDraft, Place};
    use chrono::Duration;

    fn user(first: &str) -> User {
        User::invited(&format!("{}@example.com", first.to_lowercase()), first, "").unwrap()
    }

    #[test]
    fn test_new_message_clears_reads() {
        let a = user("A");
        let b = user("B");
        let c = user("C");
        let mut t = Thread::new("Hi", &a, &[b.clone(), c.clone()]).unwrap();
        for u in [&a, &b, &c] {
            t.mark_as_read(&u.key);
        }

        let m = Message::new_thread_message(&b, &mut t, "hi").unwrap();

        assert_eq!(t.reads.len(), 1);
        assert_eq!(t.reads[0].user_key, b.key);
        let preview = t.preview.as_ref().unwrap();
        assert_eq!(preview.body, "hi");
        assert_eq!(preview.timestamp, m.timestamp);
        assert_eq!(preview.sender.key, b.key);
        assert!(m.is_read(&b.key));
        assert_eq!(m.parent_key, t.key);
    }

    #[test]
    fn test_empty_body_rejected() {
        let a = user("A");
        let mut t = Thread::new("Hi", &a, &[]).unwrap();
        assert!(Message::new_thread_message(&a, &mut t, "   ").is_err());
        assert!(t.preview.is_none());
    }

    #[test]
    fn test_outsider_cannot_post() {
        let a = user("A");
        let mut t = Thread::new("Hi", &a, &[]).unwrap();
        assert!(matches!(
            Message::new_thread_message(&user("Z"), &mut t, "hello"),
            Err(ConvoError::Forbidden(_))
        ));
    }

    #[test]
    fn test_event_message() {
        let o = user("O");
        let g = user("G");
        let draft = EventDraft {
            name: "Dinner".into(),
            description: String::new(),
            place: Place::default(),
            timestamp: Utc::now() + Duration::days(1),
            utc_offset: 0,
            guests_can_invite: false,
        };
        let mut e = Event::new(draft, &o, &[], &[g.clone()]).unwrap();
        e.mark_as_read(&o.key);

        let m = Message::new_event_message(&g, &mut e, "see you there").unwrap();
        assert_eq!(m.parent_key, e.key);
        assert_eq!(e.reads.len(), 1);
        assert!(e.is_read(&g.key));
    }

    #[test]
    fn test_legacy_thread_key_field() {
        let a = user("A");
        let mut t = Thread::new("Hi", &a, &[]).unwrap();
        let m = Message::new_thread_message(&a, &mut t, "old").unwrap();

        let mut doc = serde_json::to_value(&m).unwrap();
        let obj = doc.as_object_mut().unwrap();
        let parent = obj.remove("ParentKey").unwrap();
        obj.insert("ThreadKey".into(), parent);

        let back: Message = serde_json::from_value(doc).unwrap();
        assert_eq!(back.parent_key, t.key);

        let rewritten = serde_json::to_value(&back).unwrap();
        assert!(rewritten.get("ParentKey").is_some());
        assert!(rewritten.get("ThreadKey").is_none());
    }
}
