//! Per-user read tracking shared by threads, events and messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use convo_shared::Key;

use super::user::UserPartial;

/// One user's read mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Read {
    pub user_key: Key,
    pub timestamp: DateTime<Utc>,
}

impl Read {
    pub fn now(user_key: Key) -> Self {
        Self {
            user_key,
            timestamp: Utc::now(),
        }
    }
}

/// Anything carrying a set of read marks, at most one per user.
pub trait Readable {
    fn reads(&self) -> &[Read];

    fn reads_mut(&mut self) -> &mut Vec<Read>;

    /// Record that `user` has read this. Returns false if already marked.
    fn mark_as_read(&mut self, user: &Key) -> bool {
        if self.is_read(user) {
            return false;
        }
        self.reads_mut().push(Read::now(*user));
        true
    }

    fn clear_reads(&mut self) {
        self.reads_mut().clear();
    }

    fn is_read(&self, user: &Key) -> bool {
        self.reads().iter().any(|r| r.user_key == *user)
    }

    /// Snapshots of the members that have read this, in mark order. Marks
    /// from users outside `members` are dropped.
    fn map_reads_to_members(&self, members: &[UserPartial]) -> Vec<UserPartial> {
        self.reads()
            .iter()
            .filter_map(|r| members.iter().find(|m| m.key == r.user_key))
            .cloned()
            .collect()
    }

    /// Re-attribute `old`'s mark to `new`, keeping the first mark per user.
    fn swap_reads(&mut self, old: &Key, new: &Key) {
        let reads = self.reads_mut();
        for read in reads.iter_mut() {
            if read.user_key == *old {
                read.user_key = *new;
            }
        }
        let mut seen = std::collections::HashSet::new();
        reads.retain(|r| seen.insert(r.user_key));
    }
}
