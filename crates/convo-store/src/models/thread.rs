use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use convo_shared::address::reply_address;
use convo_shared::constants::THREAD_MAIL_DOMAIN;
use convo_shared::key;
use convo_shared::{ConvoError, Key, Kind, Result};

use super::readable::{Read, Readable};
use super::user::{User, UserPartial};
use crate::database::Entity;

/// Latest message shown in thread listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessagePreview {
    pub body: String,
    pub sender: UserPartial,
    pub timestamp: DateTime<Utc>,
}

/// An email-style conversation. The owner is a participant but is never
/// listed among `user_keys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Thread {
    pub key: Key,
    pub owner_key: Key,
    #[serde(default)]
    pub user_keys: Vec<Key>,
    pub subject: String,
    #[serde(default)]
    pub preview: Option<MessagePreview>,
    #[serde(default)]
    pub reads: Vec<Read>,
    pub created_at: DateTime<Utc>,

    /// Filled in by hydration.
    #[serde(skip)]
    pub owner: Option<UserPartial>,
    #[serde(skip)]
    pub users: Vec<UserPartial>,
}

impl Entity for Thread {
    const KIND: Kind = Kind::Thread;

    fn key(&self) -> &Key {
        &self.key
    }
}

impl Readable for Thread {
    fn reads(&self) -> &[Read] {
        &self.reads
    }

    fn reads_mut(&mut self) -> &mut Vec<Read> {
        &mut self.reads
    }
}

/// "Alice", "Alice and Bob", "Alice, Bob and Carol".
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}

fn default_subject(owner: &User, members: &[&User]) -> String {
    if members.is_empty() {
        return format!("{}'s thread", owner.first_name);
    }
    let mut names = Vec::with_capacity(members.len());
    names.push(owner.first_name.clone());
    for member in members {
        names.push(member.full_name.clone());
    }
    format!("{} with {}", names[0], join_names(&names[1..]))
}

impl Thread {
    /// Build a thread owned by `owner` with `users` as members. The owner
    /// and repeated users are dropped from the member list.
    pub fn new(subject: &str, owner: &User, users: &[User]) -> Result<Self> {
        let mut members: Vec<&User> = Vec::with_capacity(users.len());
        for user in users {
            if user.key != owner.key && !members.iter().any(|m| m.key == user.key) {
                members.push(user);
            }
        }

        let subject = match subject.trim() {
            "" => default_subject(owner, &members),
            s => s.to_string(),
        };

        Ok(Self {
            key: Key::generate(Kind::Thread),
            owner_key: owner.key,
            user_keys: members.iter().map(|m| m.key).collect(),
            subject,
            preview: None,
            reads: Vec::new(),
            created_at: Utc::now(),
            owner: Some(owner.snapshot()),
            users: members.iter().map(|m| m.snapshot()).collect(),
        })
    }

    pub fn owner_is(&self, user: &Key) -> bool {
        self.owner_key == *user
    }

    /// Owner or member.
    pub fn has_user(&self, user: &Key) -> bool {
        self.owner_is(user) || key::contains(&self.user_keys, user)
    }

    /// Owner first, then members.
    pub fn participant_keys(&self) -> Vec<Key> {
        let mut keys = Vec::with_capacity(self.user_keys.len() + 1);
        keys.push(self.owner_key);
        keys.extend(self.user_keys.iter().copied());
        keys
    }

    /// Owner snapshot first, then member snapshots.
    pub fn participants(&self) -> Vec<UserPartial> {
        let mut all = Vec::with_capacity(self.users.len() + 1);
        if let Some(owner) = &self.owner {
            all.push(owner.clone());
        }
        all.extend(self.users.iter().cloned());
        all
    }

    /// Returns false if `user` already participates.
    pub fn add_user(&mut self, user: &User) -> bool {
        if self.has_user(&user.key) {
            return false;
        }
        self.user_keys.push(user.key);
        self.users.push(user.snapshot());
        true
    }

    pub fn remove_user(&mut self, user: &Key) -> Result<()> {
        if self.owner_is(user) {
            return Err(ConvoError::Forbidden(
                "The owner cannot be removed from the thread".into(),
            ));
        }
        if key::swap_remove(&mut self.user_keys, user).is_none() {
            return Err(ConvoError::NotFound("This user is not in the thread".into()));
        }
        if let Some(idx) = self.users.iter().position(|u| u.key == *user) {
            self.users.swap_remove(idx);
        }
        Ok(())
    }

    pub fn set_preview(&mut self, body: &str, sender: UserPartial, timestamp: DateTime<Utc>) {
        self.preview = Some(MessagePreview {
            body: body.to_string(),
            sender,
            timestamp,
        });
    }

    /// Most recent activity, for ordering listings.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.preview
            .as_ref()
            .map(|p| p.timestamp)
            .unwrap_or(self.created_at)
    }

    pub fn get_email(&self) -> String {
        self.get_email_at(THREAD_MAIL_DOMAIN)
    }

    pub fn get_email_at(&self, domain: &str) -> String {
        reply_address(&self.subject, self.key.id(), domain)
    }

    /// Re-point every reference to `old` at `new`.
    pub fn swap_user(&mut self, old: &Key, new: &Key) {
        if self.owner_key == *old {
            self.owner_key = *new;
        }
        self.user_keys = key::swap(&self.user_keys, old, new);
        let owner = self.owner_key;
        self.user_keys.retain(|k| *k != owner);
        if let Some(preview) = &mut self.preview {
            if preview.sender.key == *old {
                preview.sender.key = *new;
            }
        }
        self.swap_reads(old, new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> User {
        User::invited(&format!("{}@example.com", first.to_lowercase()), first, last).unwrap()
    }

    #[test]
    fn test_owner_excluded_from_members() {
        let alice = user("Alice", "A");
        let bob = user("Bob", "B");
        let thread = Thread::new("Hi", &alice, &[alice.clone(), bob.clone(), bob.clone()]).unwrap();

        assert_eq!(thread.user_keys, vec![bob.key]);
        assert!(thread.has_user(&alice.key));
        assert!(thread.has_user(&bob.key));
        assert_eq!(thread.participant_keys(), vec![alice.key, bob.key]);
    }

    #[test]
    fn test_default_subject() {
        let alice = user("Alice", "A");
        let bob = user("Bob", "B");
        let carol = user("Carol", "C");

        let t = Thread::new("", &alice, &[bob.clone(), carol.clone()]).unwrap();
        assert_eq!(t.subject, "Alice with Bob B and Carol C");

        let t = Thread::new("  ", &alice, &[bob.clone()]).unwrap();
        assert_eq!(t.subject, "Alice with Bob B");

        let t = Thread::new("", &alice, &[]).unwrap();
        assert_eq!(t.subject, "Alice's thread");

        let dave = user("Dave", "D");
        let t = Thread::new("", &alice, &[bob, carol, dave]).unwrap();
        assert_eq!(t.subject, "Alice with Bob B, Carol C and Dave D");
    }

    #[test]
    fn test_add_and_remove_user() {
        let alice = user("Alice", "A");
        let bob = user("Bob", "B");
        let carol = user("Carol", "C");
        let mut t = Thread::new("Hi", &alice, &[bob.clone()]).unwrap();

        assert!(t.add_user(&carol));
        assert!(!t.add_user(&carol));
        assert!(!t.add_user(&alice));
        assert_eq!(t.users.len(), 2);

        t.remove_user(&bob.key).unwrap();
        assert_eq!(t.user_keys, vec![carol.key]);
        assert_eq!(t.users.len(), 1);
        assert_eq!(t.users[0].key, carol.key);

        assert!(matches!(t.remove_user(&alice.key), Err(ConvoError::Forbidden(_))));
        assert!(matches!(t.remove_user(&bob.key), Err(ConvoError::NotFound(_))));
    }

    #[test]
    fn test_reply_address() {
        let alice = user("Alice", "A");
        let t = Thread::new("Weekend plans!", &alice, &[]).unwrap();
        assert_eq!(
            t.get_email(),
            format!("weekend-plans-{}@{}", t.key.id(), THREAD_MAIL_DOMAIN)
        );
    }

    #[test]
    fn test_snapshots_are_not_stored() {
        let alice = user("Alice", "A");
        let bob = user("Bob", "B");
        let t = Thread::new("Hi", &alice, &[bob]).unwrap();
        let doc = serde_json::to_value(&t).unwrap();
        assert!(doc.get("Users").is_none());
        assert!(doc.get("Owner").is_none());
        assert!(doc.get("UserKeys").is_some());

        let back: Thread = serde_json::from_value(doc).unwrap();
        assert!(back.users.is_empty());
        assert_eq!(back.user_keys, t.user_keys);
    }

    #[test]
    fn test_swap_user_promotes_member_to_owner() {
        let alice = user("Alice", "A");
        let bob = user("Bob", "B");
        let mut t = Thread::new("Hi", &alice, &[bob.clone()]).unwrap();
        t.mark_as_read(&alice.key);

        t.swap_user(&alice.key, &bob.key);
        assert_eq!(t.owner_key, bob.key);
        assert!(t.user_keys.is_empty());
        assert!(t.is_read(&bob.key));
        assert!(!t.is_read(&alice.key));
    }
}
