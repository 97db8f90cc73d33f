//! Persistence and hydration for [`Event`] records.
//!
//! Events need no back-reference on users: the invitee list always holds
//! the owner, so a single query on `UserKeys` finds every event a user can
//! see.

use convo_shared::{ConvoError, Key, Kind, OpContext, Result};

use crate::database::Database;
use crate::datastore::Query;
use crate::models::{Event, Readable, User};
use crate::users::partials;

impl Database {
    pub async fn create_event(&self, event: &Event) -> Result<()> {
        self.put(event).await.op("events.create")?;
        tracing::info!(event = %event.key, invitees = event.user_keys.len(), "event created");
        Ok(())
    }

    pub async fn update_event(&self, event: &Event) -> Result<()> {
        self.put(event).await.op("events.update")
    }

    /// A single event with fresh snapshots.
    pub async fn get_event(&self, key: &Key) -> Result<Event> {
        let event: Event = self.fetch(key).await.op("events.get")?;
        let mut events = vec![event];
        self.hydrate_events(&mut events).await.op("events.get")?;
        events
            .pop()
            .ok_or_else(|| ConvoError::NotFound("Event not found".into()))
    }

    /// Every event `user` is invited to (or owns), soonest first.
    ///
    /// One keys-only query and two bulk gets.
    pub async fn get_events_by_user(&self, user: &User) -> Result<Vec<Event>> {
        let keys = self
            .query_keys(&Query::new(Kind::Event).filter("UserKeys", user.key))
            .await
            .op("events.by_user")?;

        let mut events: Vec<Event> = self
            .get_multi::<Event>(&keys)
            .await
            .op("events.by_user")?
            .into_iter()
            .flatten()
            .collect();

        self.hydrate_events(&mut events).await.op("events.by_user")?;
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }

    /// Rebuild owner, host, invitee and RSVP snapshots from one bulk fetch
    /// of the invitee lists. Hosts and RSVPs are subsets of the invitees
    /// and the owner is an invitee, so no other users are needed.
    pub async fn hydrate_events(&self, events: &mut [Event]) -> Result<()> {
        let mut keys = Vec::new();
        for event in events.iter() {
            keys.extend(event.user_keys.iter().copied());
        }
        if keys.is_empty() {
            return Ok(());
        }

        let users = self.get_multi::<User>(&keys).await?;
        let snapshots = partials(&keys, &users);

        let mut offset = 0;
        for event in events.iter_mut() {
            let n = event.user_keys.len();
            let slice = &snapshots[offset..offset + n];
            offset += n;

            let find = |k: &Key| slice.iter().find(|s| s.key == *k).cloned();
            event.owner = find(&event.owner_key);
            event.hosts = event.host_keys.iter().filter_map(find).collect();
            event.rsvps = event.rsvp_keys.iter().filter_map(find).collect();
            event.users = slice.to_vec();
        }
        Ok(())
    }

    /// All invitees as full user records.
    pub async fn get_users_by_event(&self, event: &Event) -> Result<Vec<User>> {
        Ok(self
            .get_multi::<User>(&event.user_keys)
            .await
            .op("events.users")?
            .into_iter()
            .flatten()
            .collect())
    }

    /// RSVP inside a store transaction so concurrent RSVPs cannot drop
    /// each other's writes. A lost race surfaces as `Conflict`.
    pub async fn add_rsvp_with_transaction(&self, event: &Key, user: &User) -> Result<Event> {
        let mut tx = self.begin().await.op("events.add_rsvp")?;
        let mut current: Event = tx.fetch(event).await.op("events.add_rsvp")?;
        current.add_rsvp(user).op("events.add_rsvp")?;
        tx.put(&current).op("events.add_rsvp")?;
        tx.commit().await.op("events.add_rsvp")?;
        tracing::debug!(event = %event, user = %user.key, "rsvp added");
        Ok(current)
    }

    pub async fn remove_rsvp_with_transaction(&self, event: &Key, user: &Key) -> Result<Event> {
        let mut tx = self.begin().await.op("events.remove_rsvp")?;
        let mut current: Event = tx.fetch(event).await.op("events.remove_rsvp")?;
        if !current.remove_rsvp(user) {
            return Err(ConvoError::Conflict("You have not RSVP'd".into())).op("events.remove_rsvp");
        }
        tx.put(&current).op("events.remove_rsvp")?;
        tx.commit().await.op("events.remove_rsvp")?;
        Ok(current)
    }

    pub async fn mark_event_read(&self, event: &mut Event, user: &Key) -> Result<()> {
        if !event.has_user(user) {
            return Err(ConvoError::NotFound("Event not found".into())).op("events.mark_read");
        }
        if event.mark_as_read(user) {
            self.put(event).await.op("events.mark_read")?;
        }
        Ok(())
    }

    /// Delete the event document. Messages are left in place.
    pub async fn delete_event(&self, event: &Event) -> Result<()> {
        self.delete(&event.key).await.op("events.delete")?;
        tracing::info!(event = %event.key, "event deleted");
        Ok(())
    }
}
