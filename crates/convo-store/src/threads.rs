//! Persistence and hydration for [`Thread`] records.
//!
//! A thread is referenced from both sides: the thread lists its members and
//! every member lists the thread in `User::threads`. Owners are found by
//! query instead, so they carry no back-reference.

use convo_shared::key;
use convo_shared::{ConvoError, Key, Kind, OpContext, Result};

use crate::database::Database;
use crate::datastore::Query;
use crate::models::{Readable, Thread, User};
use crate::users::partials;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Build and persist a thread, then record it on every member.
    pub async fn create_thread(
        &self,
        subject: &str,
        owner: &User,
        users: &[User],
    ) -> Result<Thread> {
        let thread = Thread::new(subject, owner, users).op("threads.create")?;
        self.put(&thread).await.op("threads.create")?;

        // Re-read members so concurrent edits to their records are kept.
        let mut members: Vec<User> = self
            .get_multi::<User>(&thread.user_keys)
            .await
            .op("threads.create")?
            .into_iter()
            .flatten()
            .collect();
        for member in &mut members {
            member.add_thread(&thread.key);
        }
        self.put_multi(&members).await.op("threads.create")?;

        tracing::info!(thread = %thread.key, members = members.len(), "thread created");
        Ok(thread)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// A single thread with fresh participant snapshots.
    pub async fn get_thread(&self, key: &Key) -> Result<Thread> {
        let thread: Thread = self.fetch(key).await.op("threads.get")?;
        let mut threads = vec![thread];
        self.hydrate_threads(&mut threads).await.op("threads.get")?;
        threads
            .pop()
            .ok_or_else(|| ConvoError::NotFound("Thread not found".into()))
    }

    /// Every thread `user` owns or belongs to, most recently active first.
    ///
    /// Costs one query and two bulk gets regardless of how many threads or
    /// participants are involved.
    pub async fn get_threads_by_user(&self, user: &User) -> Result<Vec<Thread>> {
        let owned = self
            .query_keys(&Query::new(Kind::Thread).filter("OwnerKey", user.key))
            .await
            .op("threads.by_user")?;

        let mut candidates = owned;
        candidates.extend(user.threads.iter().copied());
        let candidates = key::dedupe(&candidates);

        let mut threads: Vec<Thread> = self
            .get_multi::<Thread>(&candidates)
            .await
            .op("threads.by_user")?
            .into_iter()
            .flatten()
            // The member list may be stale; trust the thread document.
            .filter(|t| t.has_user(&user.key))
            .collect();

        self.hydrate_threads(&mut threads).await.op("threads.by_user")?;
        threads.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        Ok(threads)
    }

    /// Replace participant snapshots with ones built from a single bulk
    /// fetch of every referenced user.
    pub async fn hydrate_threads(&self, threads: &mut [Thread]) -> Result<()> {
        let mut keys = Vec::new();
        let mut arity = Vec::with_capacity(threads.len());
        for thread in threads.iter() {
            let participants = thread.participant_keys();
            arity.push(participants.len());
            keys.extend(participants);
        }
        if keys.is_empty() {
            return Ok(());
        }

        let users = self.get_multi::<User>(&keys).await?;
        let snapshots = partials(&keys, &users);

        let mut offset = 0;
        for (thread, n) in threads.iter_mut().zip(arity) {
            let slice = &snapshots[offset..offset + n];
            thread.owner = slice.first().cloned();
            thread.users = slice.iter().skip(1).cloned().collect();
            offset += n;
        }
        Ok(())
    }

    /// Owner and members as full user records, owner first. Users that no
    /// longer exist are skipped.
    pub async fn get_users_by_thread(&self, thread: &Thread) -> Result<Vec<User>> {
        let keys = thread.participant_keys();
        Ok(self
            .get_multi::<User>(&keys)
            .await
            .op("threads.users")?
            .into_iter()
            .flatten()
            .collect())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub async fn add_user_to_thread(&self, thread: &mut Thread, user: &mut User) -> Result<bool> {
        if !thread.add_user(user) {
            return Ok(false);
        }
        user.add_thread(&thread.key);
        self.put(thread).await.op("threads.add_user")?;
        self.put(user).await.op("threads.add_user")?;
        Ok(true)
    }

    pub async fn remove_user_from_thread(&self, thread: &mut Thread, user: &mut User) -> Result<()> {
        thread.remove_user(&user.key).op("threads.remove_user")?;
        user.remove_thread(&thread.key);
        self.put(thread).await.op("threads.remove_user")?;
        self.put(user).await.op("threads.remove_user")?;
        Ok(())
    }

    pub async fn mark_thread_read(&self, thread: &mut Thread, user: &Key) -> Result<()> {
        if !thread.has_user(user) {
            return Err(ConvoError::NotFound("Thread not found".into())).op("threads.mark_read");
        }
        if thread.mark_as_read(user) {
            self.put(thread).await.op("threads.mark_read")?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete the thread and drop it from every member's thread list.
    /// Messages are left in place.
    pub async fn delete_thread(&self, thread: &Thread) -> Result<()> {
        let mut members: Vec<User> = self
            .get_multi::<User>(&thread.user_keys)
            .await
            .op("threads.delete")?
            .into_iter()
            .flatten()
            .collect();
        members.retain_mut(|u| u.remove_thread(&thread.key));
        self.put_multi(&members).await.op("threads.delete")?;
        self.delete(&thread.key).await.op("threads.delete")?;
        tracing::info!(thread = %thread.key, "thread deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    async fn user(db: &Database, first: &str) -> User {
        let u = User::invited(&format!("{}@example.com", first.to_lowercase()), first, "Z").unwrap();
        db.create_user(&u).await.unwrap();
        u
    }

    #[tokio::test]
    async fn test_create_thread_links_members() {
        let (db, _) = Database::memory();
        let alice = user(&db, "Alice").await;
        let bob = user(&db, "Bob").await;

        let thread = db.create_thread("", &alice, &[bob.clone()]).await.unwrap();
        let bob = db.get_user(&bob.key).await.unwrap();
        let alice = db.get_user(&alice.key).await.unwrap();

        assert_eq!(bob.threads, vec![thread.key]);
        assert!(alice.threads.is_empty());
        assert_eq!(thread.subject, "Alice with Bob Z");
    }

    #[tokio::test]
    async fn test_hydration_round_trips_are_bounded() {
        let (db, store) = Database::memory();
        let alice = user(&db, "Alice").await;
        let mut others = Vec::new();
        for i in 0..6 {
            others.push(user(&db, &format!("U{i}")).await);
        }

        for chunk in others.chunks(2) {
            db.create_thread("owned", &alice, chunk).await.unwrap();
        }
        // Alice as a plain member of threads owned by others.
        for owner in others.iter().take(3) {
            db.create_thread("member", owner, &[alice.clone()]).await.unwrap();
        }
        let alice = db.get_user(&alice.key).await.unwrap();

        store.reset_stats();
        let threads = db.get_threads_by_user(&alice).await.unwrap();
        let stats = store.stats();

        assert_eq!(threads.len(), 6);
        assert_eq!(stats.queries, 1);
        assert_eq!(stats.get_multis, 2);
        assert_eq!(stats.gets, 0);

        for t in &threads {
            assert_eq!(t.owner.as_ref().unwrap().key, t.owner_key);
            let member_keys: Vec<Key> = t.users.iter().map(|u| u.key).collect();
            assert_eq!(member_keys, t.user_keys);
            assert!(!t.user_keys.contains(&t.owner_key));
        }
    }

    #[tokio::test]
    async fn test_missing_member_gets_placeholder() {
        let (db, _) = Database::memory();
        let alice = user(&db, "Alice").await;
        let bob = user(&db, "Bob").await;
        let thread = db.create_thread("Hi", &alice, &[bob.clone()]).await.unwrap();
        db.delete(&bob.key).await.unwrap();

        let hydrated = db.get_thread(&thread.key).await.unwrap();
        assert_eq!(hydrated.users.len(), 1);
        assert_eq!(hydrated.users[0].full_name, "Deleted user");
        assert_eq!(hydrated.owner.unwrap().full_name, "Alice Z");
    }

    #[tokio::test]
    async fn test_users_by_thread_includes_owner() {
        let (db, _) = Database::memory();
        let alice = user(&db, "Alice").await;
        let bob = user(&db, "Bob").await;
        let carol = user(&db, "Carol").await;
        let thread = db
            .create_thread("Hi", &alice, &[bob.clone(), carol.clone()])
            .await
            .unwrap();

        let users = db.get_users_by_thread(&thread).await.unwrap();
        let keys: Vec<Key> = users.iter().map(|u| u.key).collect();
        assert_eq!(keys, vec![alice.key, bob.key, carol.key]);
    }

    #[tokio::test]
    async fn test_add_and_remove_member() {
        let (db, _) = Database::memory();
        let alice = user(&db, "Alice").await;
        let mut bob = user(&db, "Bob").await;
        let mut thread = db.create_thread("Hi", &alice, &[]).await.unwrap();

        assert!(db.add_user_to_thread(&mut thread, &mut bob).await.unwrap());
        assert!(!db.add_user_to_thread(&mut thread, &mut bob).await.unwrap());
        assert_eq!(db.get_user(&bob.key).await.unwrap().threads, vec![thread.key]);

        db.remove_user_from_thread(&mut thread, &mut bob).await.unwrap();
        assert!(db.get_user(&bob.key).await.unwrap().threads.is_empty());
        let stored = db.get_thread(&thread.key).await.unwrap();
        assert!(stored.user_keys.is_empty());
    }

    #[tokio::test]
    async fn test_delete_thread_keeps_messages() {
        let (db, _) = Database::memory();
        let alice = user(&db, "Alice").await;
        let bob = user(&db, "Bob").await;
        let mut thread = db.create_thread("Hi", &alice, &[bob.clone()]).await.unwrap();
        let message = Message::new_thread_message(&alice, &mut thread, "bye").unwrap();
        db.commit_message(&message).await.unwrap();

        db.delete_thread(&thread).await.unwrap();
        assert!(db.get_thread(&thread.key).await.is_err());
        assert!(db.get_user(&bob.key).await.unwrap().threads.is_empty());
        assert_eq!(db.get_messages_by_parent(&thread.key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_thread_read() {
        let (db, _) = Database::memory();
        let alice = user(&db, "Alice").await;
        let bob = user(&db, "Bob").await;
        let mut thread = db.create_thread("Hi", &alice, &[bob.clone()]).await.unwrap();

        db.mark_thread_read(&mut thread, &bob.key).await.unwrap();
        let stored = db.get_thread(&thread.key).await.unwrap();
        assert!(stored.is_read(&bob.key));

        let stranger = Key::new(Kind::User, 77);
        assert!(db.mark_thread_read(&mut thread, &stranger).await.is_err());
    }
}
