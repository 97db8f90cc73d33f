//! Activity feed notifications.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use convo_shared::Key;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verb {
    #[serde(rename = "AddRSVP")]
    AddRsvp,
    #[serde(rename = "RemoveRSVP")]
    RemoveRsvp,
    NewMessage,
    NewEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub actor: String,
    pub verb: Verb,
    /// `<target_type>:<target_id>`
    pub object: String,
    pub target_name: String,
}

impl Activity {
    pub fn new(actor: &Key, verb: Verb, target: &Key, target_name: &str) -> Self {
        Self {
            actor: actor.encode(),
            verb,
            object: format!("{}:{}", target.kind().as_str().to_lowercase(), target.encode()),
            target_name: target_name.to_string(),
        }
    }
}

pub fn feed_id(user: &Key) -> String {
    format!("notification:{}", user.encode())
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn add_activity(&self, feed: &str, activity: &Activity) -> Result<()>;

    /// Token a client uses to subscribe to its own feed.
    fn realtime_token(&self, user: &Key) -> String;
}

/// Post `activity` to every recipient's feed except the actor's own.
/// Failures are logged per feed and do not stop the rest.
pub async fn notify(notifier: &dyn Notifier, recipients: &[Key], activity: &Activity) -> usize {
    let mut delivered = 0;
    for user in recipients {
        if user.encode() == activity.actor {
            continue;
        }
        let feed = feed_id(user);
        match notifier.add_activity(&feed, activity).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(feed = %feed, verb = ?activity.verb, "activity not delivered: {}", e),
        }
    }
    delivered
}

#[derive(Default)]
pub struct MemoryNotifier {
    activities: Mutex<Vec<(String, Activity)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn feed(&self, feed: &str) -> Vec<Activity> {
        self.activities
            .lock()
            .await
            .iter()
            .filter(|(f, _)| f == feed)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.activities.lock().await.len()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn add_activity(&self, feed: &str, activity: &Activity) -> Result<()> {
        tracing::debug!(feed, verb = ?activity.verb, object = %activity.object, "activity added");
        self.activities
            .lock()
            .await
            .push((feed.to_string(), activity.clone()));
        Ok(())
    }

    fn realtime_token(&self, user: &Key) -> String {
        format!("local-{}", feed_id(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_shared::Kind;

    #[test]
    fn test_activity_shape() {
        let actor = Key::new(Kind::User, 1);
        let event = Key::new(Kind::Event, 2);
        let a = Activity::new(&actor, Verb::AddRsvp, &event, "Dinner");
        assert_eq!(a.object, format!("event:{}", event.encode()));

        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["verb"], "AddRSVP");
        assert_eq!(json["targetName"], "Dinner");
    }

    #[tokio::test]
    async fn test_notify_skips_actor() {
        let notifier = MemoryNotifier::new();
        let actor = Key::new(Kind::User, 1);
        let other = Key::new(Kind::User, 3);
        let thread = Key::new(Kind::Thread, 9);
        let activity = Activity::new(&actor, Verb::NewMessage, &thread, "Plans");

        let delivered = notify(&notifier, &[actor, other], &activity).await;
        assert_eq!(delivered, 1);
        assert_eq!(notifier.feed(&feed_id(&other)).await, vec![activity]);
        assert!(notifier.feed(&feed_id(&actor)).await.is_empty());
        assert!(notifier.realtime_token(&other).contains("notification:"));
    }
}
