use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use convo_shared::address::reply_address;
use convo_shared::constants::{
    EVENT_MAIL_DOMAIN, MAX_EVENT_INVITEES, UPCOMING_WINDOW_END_HOURS, UPCOMING_WINDOW_START_HOURS,
};
use convo_shared::key;
use convo_shared::{ConvoError, FieldErrors, Key, Kind, Result};

use super::readable::{Read, Readable};
use super::user::{User, UserPartial};
use crate::database::Entity;

/// A resolved location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Place {
    pub place_id: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    /// Seconds east of UTC at the place.
    #[serde(default)]
    pub utc_offset: i32,
}

/// Caller-supplied fields of a new event.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub name: String,
    pub description: String,
    pub place: Place,
    pub timestamp: DateTime<Utc>,
    pub utc_offset: i32,
    pub guests_can_invite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    pub key: Key,
    pub owner_key: Key,
    #[serde(default)]
    pub host_keys: Vec<Key>,
    /// Invitees, owner included.
    pub user_keys: Vec<Key>,
    #[serde(default)]
    pub rsvp_keys: Vec<Key>,
    pub place: Place,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub utc_offset: i32,
    pub created_at: DateTime<Utc>,
    /// Older documents predate this flag.
    #[serde(default)]
    pub guests_can_invite: bool,
    #[serde(default)]
    pub reads: Vec<Read>,

    #[serde(skip)]
    pub owner: Option<UserPartial>,
    #[serde(skip)]
    pub hosts: Vec<UserPartial>,
    #[serde(skip)]
    pub users: Vec<UserPartial>,
    #[serde(skip)]
    pub rsvps: Vec<UserPartial>,
}

impl Entity for Event {
    const KIND: Kind = Kind::Event;

    fn key(&self) -> &Key {
        &self.key
    }
}

impl Readable for Event {
    fn reads(&self) -> &[Read] {
        &self.reads
    }

    fn reads_mut(&mut self) -> &mut Vec<Read> {
        &mut self.reads
    }
}

fn in_the_future(timestamp: &DateTime<Utc>) -> Result<()> {
    if *timestamp <= Utc::now() {
        return Err(ConvoError::invalid("time", "Your event must be in the future"));
    }
    Ok(())
}

fn max_guests() -> ConvoError {
    ConvoError::Limit("This event has the maximum number of guests".into())
}

/// Escape TEXT values per RFC 5545.
fn ics_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

fn ics_time(t: &DateTime<Utc>) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

impl Event {
    /// Invitees are owner first, then hosts, then the remaining users,
    /// without repeats. Hosts never include the owner.
    pub fn new(draft: EventDraft, owner: &User, hosts: &[User], users: &[User]) -> Result<Self> {
        let mut fields = FieldErrors::new();
        if draft.name.trim().is_empty() {
            fields.insert("name".into(), "This field is required".into());
        }
        if draft.timestamp <= Utc::now() {
            fields.insert("time".into(), "Your event must be in the future".into());
        }
        if !fields.is_empty() {
            return Err(ConvoError::InvalidInput(fields));
        }

        let mut invitees: Vec<&User> = vec![owner];
        let mut host_list: Vec<&User> = Vec::new();
        for host in hosts {
            if host.key == owner.key || host_list.iter().any(|h| h.key == host.key) {
                continue;
            }
            host_list.push(host);
            if !invitees.iter().any(|u| u.key == host.key) {
                invitees.push(host);
            }
        }
        for user in users {
            if !invitees.iter().any(|u| u.key == user.key) {
                invitees.push(user);
            }
        }
        if invitees.len() > MAX_EVENT_INVITEES {
            return Err(max_guests());
        }

        Ok(Self {
            key: Key::generate(Kind::Event),
            owner_key: owner.key,
            host_keys: host_list.iter().map(|h| h.key).collect(),
            user_keys: invitees.iter().map(|u| u.key).collect(),
            rsvp_keys: Vec::new(),
            place: draft.place,
            name: draft.name.trim().to_string(),
            description: draft.description,
            timestamp: draft.timestamp,
            utc_offset: draft.utc_offset,
            created_at: Utc::now(),
            guests_can_invite: draft.guests_can_invite,
            reads: Vec::new(),
            owner: Some(owner.snapshot()),
            hosts: host_list.iter().map(|h| h.snapshot()).collect(),
            users: invitees.iter().map(|u| u.snapshot()).collect(),
            rsvps: Vec::new(),
        })
    }

    pub fn owner_is(&self, user: &Key) -> bool {
        self.owner_key == *user
    }

    pub fn is_host(&self, user: &Key) -> bool {
        self.owner_is(user) || key::contains(&self.host_keys, user)
    }

    pub fn has_user(&self, user: &Key) -> bool {
        key::contains(&self.user_keys, user)
    }

    pub fn has_rsvp(&self, user: &Key) -> bool {
        key::contains(&self.rsvp_keys, user)
    }

    /// Owner and hosts may always invite; guests only when allowed.
    pub fn can_invite(&self, user: &Key) -> bool {
        self.is_host(user) || (self.guests_can_invite && self.has_user(user))
    }

    pub fn add_user(&mut self, user: &User) -> Result<()> {
        if self.owner_is(&user.key) || self.has_user(&user.key) {
            return Err(ConvoError::Conflict(
                "This user has already been invited".into(),
            ));
        }
        if self.user_keys.len() >= MAX_EVENT_INVITEES {
            return Err(max_guests());
        }
        self.user_keys.push(user.key);
        self.users.push(user.snapshot());
        Ok(())
    }

    /// Uninvite `user`, dropping any host role and RSVP with it.
    pub fn remove_user(&mut self, user: &Key) -> Result<()> {
        if self.owner_is(user) {
            return Err(ConvoError::Forbidden(
                "The owner cannot be removed from the event".into(),
            ));
        }
        if key::swap_remove(&mut self.user_keys, user).is_none() {
            return Err(ConvoError::NotFound("This user is not invited".into()));
        }
        key::swap_remove(&mut self.host_keys, user);
        key::swap_remove(&mut self.rsvp_keys, user);
        for snapshots in [&mut self.users, &mut self.hosts, &mut self.rsvps] {
            if let Some(idx) = snapshots.iter().position(|u| u.key == *user) {
                snapshots.swap_remove(idx);
            }
        }
        Ok(())
    }

    /// Promote an invitee (inviting them first if needed) to host.
    pub fn add_host(&mut self, user: &User) -> Result<()> {
        if self.is_host(&user.key) {
            return Ok(());
        }
        if !self.has_user(&user.key) {
            self.add_user(user)?;
        }
        self.host_keys.push(user.key);
        self.hosts.push(user.snapshot());
        Ok(())
    }

    /// RSVP `user` and reset read state so every invitee sees the change.
    pub fn add_rsvp(&mut self, user: &User) -> Result<()> {
        if self.owner_is(&user.key) || self.has_rsvp(&user.key) {
            return Err(ConvoError::Conflict("You have already RSVP'd".into()));
        }
        if !self.has_user(&user.key) {
            return Err(ConvoError::Forbidden(
                "You are not invited to this event".into(),
            ));
        }
        self.rsvp_keys.push(user.key);
        self.rsvps.push(user.snapshot());
        self.clear_reads();
        Ok(())
    }

    /// Returns false if `user` had not RSVP'd.
    pub fn remove_rsvp(&mut self, user: &Key) -> bool {
        if key::swap_remove(&mut self.rsvp_keys, user).is_none() {
            return false;
        }
        if let Some(idx) = self.rsvps.iter().position(|u| u.key == *user) {
            self.rsvps.swap_remove(idx);
        }
        true
    }

    pub fn reschedule(&mut self, timestamp: DateTime<Utc>, utc_offset: i32) -> Result<()> {
        in_the_future(&timestamp)?;
        self.timestamp = timestamp;
        self.utc_offset = utc_offset;
        Ok(())
    }

    pub fn is_in_future(&self) -> bool {
        self.timestamp > Utc::now()
    }

    pub fn is_upcoming(&self) -> bool {
        self.is_upcoming_at(Utc::now())
    }

    pub fn is_upcoming_at(&self, now: DateTime<Utc>) -> bool {
        let start = now + Duration::hours(UPCOMING_WINDOW_START_HOURS);
        let end = now + Duration::hours(UPCOMING_WINDOW_END_HOURS);
        self.timestamp >= start && self.timestamp <= end
    }

    /// Local wall-clock time at the event, e.g. "Monday, January 2 @ 3:04 PM".
    pub fn get_formatted_time(&self) -> String {
        let offset = FixedOffset::east_opt(self.utc_offset).unwrap_or_else(|| Utc.fix());
        self.timestamp
            .with_timezone(&offset)
            .format("%A, %B %-d @ %-I:%M %p")
            .to_string()
    }

    pub fn get_email(&self) -> String {
        self.get_email_at(EVENT_MAIL_DOMAIN)
    }

    pub fn get_email_at(&self, domain: &str) -> String {
        reply_address(&self.name, self.key.id(), domain)
    }

    /// iCalendar invitation with the reply address as organizer.
    pub fn get_ics(&self) -> String {
        let organizer = self
            .owner
            .as_ref()
            .map(|o| o.full_name.clone())
            .unwrap_or_default();
        let lines = [
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "PRODID:-//Convo//Convo Events//EN".to_string(),
            "METHOD:REQUEST".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", self.key.encode()),
            format!("DTSTAMP:{}", ics_time(&Utc::now())),
            format!("DTSTART:{}", ics_time(&self.timestamp)),
            format!("DTEND:{}", ics_time(&(self.timestamp + Duration::hours(1)))),
            format!("SUMMARY:{}", ics_escape(&self.name)),
            format!("LOCATION:{}", ics_escape(&self.place.address)),
            format!("DESCRIPTION:{}", ics_escape(&self.description)),
            format!(
                "ORGANIZER;CN=\"{}\":mailto:{}",
                organizer.replace('"', "'"),
                self.get_email()
            ),
            "END:VEVENT".to_string(),
            "END:VCALENDAR".to_string(),
        ];
        let mut ics = lines.join("\r\n");
        ics.push_str("\r\n");
        ics
    }

    /// Re-point every reference to `old` at `new`.
    pub fn swap_user(&mut self, old: &Key, new: &Key) {
        if self.owner_key == *old {
            self.owner_key = *new;
        }
        let owner = self.owner_key;
        self.user_keys = key::swap(&self.user_keys, old, new);
        self.host_keys = key::swap(&self.host_keys, old, new);
        self.host_keys.retain(|k| *k != owner);
        self.rsvp_keys = key::swap(&self.rsvp_keys, old, new);
        self.rsvp_keys.retain(|k| *k != owner);
        self.swap_reads(old, new);
    }
}
