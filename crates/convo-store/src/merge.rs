//! Folding one user account into another.
//!
//! A merge rewrites every reference to the old user across contacts,
//! messages, threads and events. It is not atomic: each step is a bulk read
//! followed by a bulk write, and every rewrite is idempotent, so a merge
//! that fails half-way is completed by running it again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use convo_shared::{key, ConvoError, Key, Kind, OpContext, Result};

use crate::database::{Database, Entity};
use crate::datastore::Query;
use crate::models::{Event, Message, Thread, User};

/// Documents rewritten by one merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub contacts: usize,
    pub messages: usize,
    pub threads: usize,
    pub events: usize,
}

/// Merges currently running in this process, keyed by `(old, new)`.
#[derive(Default)]
pub struct MergeLocks {
    active: Mutex<HashSet<(Key, Key)>>,
}

/// Held for the duration of one merge; releases the pair on drop.
pub struct MergeGuard {
    locks: Arc<MergeLocks>,
    pair: (Key, Key),
}

impl MergeLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquire(self: &Arc<Self>, old: &Key, new: &Key) -> Result<MergeGuard> {
        let pair = (*old, *new);
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(pair) {
            return Err(ConvoError::Conflict(
                "A merge for these users is already running".into(),
            ));
        }
        Ok(MergeGuard {
            locks: Arc::clone(self),
            pair,
        })
    }

    pub fn is_running(&self, old: &Key, new: &Key) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(*old, *new))
    }
}

impl Drop for MergeGuard {
    fn drop(&mut self) {
        self.locks
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.pair);
    }
}

impl Database {
    /// Keys matching any of `filters` (field == value), without repeats.
    async fn keys_matching(&self, kind: Kind, filters: &[&str], value: &Key) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        for field in filters {
            keys.extend(
                self.query_keys(&Query::new(kind).filter(field, value))
                    .await?,
            );
        }
        Ok(key::dedupe(&keys))
    }

    async fn load_all<T: Entity>(&self, keys: &[Key]) -> Result<Vec<T>> {
        Ok(self.get_multi::<T>(keys).await?.into_iter().flatten().collect())
    }

    /// Rewrite every reference to `old` so it points at `new`.
    ///
    /// `new` also absorbs `old`'s contacts, thread memberships and linked
    /// identities. The old user document is left for the caller to delete.
    pub async fn merge_users(&self, old: &User, new: &User) -> Result<MergeReport> {
        if old.key == new.key {
            return Err(ConvoError::invalid("users", "Cannot merge a user into itself"))
                .op("merge");
        }
        let (o, n) = (old.key, new.key);
        let mut report = MergeReport::default();
        tracing::info!(old = %o, new = %n, "merging users");

        // Target account first, from fresh copies of both records.
        let source = self.get::<User>(&o).await.op("merge.users")?.unwrap_or_else(|| old.clone());
        let mut target: User = self.fetch(&n).await.op("merge.users")?;
        target.absorb(&source);

        // 1. Contacts held by everyone else.
        let keys = self
            .keys_matching(Kind::User, &["Contacts"], &o)
            .await
            .op("merge.contacts")?;
        let mut users: Vec<User> = self.load_all(&keys).await.op("merge.contacts")?;
        users.retain(|u| u.key != o && u.key != n);
        for user in &mut users {
            user.contacts = key::swap(&user.contacts, &o, &n);
            let me = user.key;
            user.contacts.retain(|k| *k != me);
        }
        self.put_multi(&users).await.op("merge.contacts")?;
        report.contacts = users.len();

        // 2. Messages written or read by the old user.
        let keys = self
            .keys_matching(Kind::Message, &["UserKey", "Reads.UserKey"], &o)
            .await
            .op("merge.messages")?;
        let mut messages: Vec<Message> = self.load_all(&keys).await.op("merge.messages")?;
        for message in &mut messages {
            message.swap_user(&o, &n);
        }
        self.put_multi(&messages).await.op("merge.messages")?;
        report.messages = messages.len();

        // 3. Threads.
        let keys = self
            .keys_matching(Kind::Thread, &["OwnerKey", "UserKeys", "Reads.UserKey"], &o)
            .await
            .op("merge.threads")?;
        let mut threads: Vec<Thread> = self.load_all(&keys).await.op("merge.threads")?;
        for thread in &mut threads {
            thread.swap_user(&o, &n);
        }
        self.put_multi(&threads).await.op("merge.threads")?;
        report.threads = threads.len();

        // Threads the target owns never belong in its member list, including
        // ones it owned before this run.
        let owned = self
            .query_keys(&Query::new(Kind::Thread).filter("OwnerKey", n))
            .await
            .op("merge.users")?;
        target.threads.retain(|k| !owned.contains(k));
        self.put(&target).await.op("merge.users")?;

        // 4. Events.
        let keys = self
            .keys_matching(Kind::Event, &["OwnerKey", "UserKeys", "Reads.UserKey"], &o)
            .await
            .op("merge.events")?;
        let mut events: Vec<Event> = self.load_all(&keys).await.op("merge.events")?;
        for event in &mut events {
            event.swap_user(&o, &n);
        }
        self.put_multi(&events).await.op("merge.events")?;
        report.events = events.len();

        tracing::info!(
            old = %o,
            new = %n,
            contacts = report.contacts,
            messages = report.messages,
            threads = report.threads,
            events = report.events,
            "merge complete"
        );
        Ok(report)
    }
}
