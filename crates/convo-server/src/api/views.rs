//! JSON shapes returned to clients.

use chrono::{DateTime, Utc};
use serde::Serialize;

use convo_shared::Key;
use convo_store::{Event, Message, MessagePreview, Readable, Thread, User, UserPartial};

/// The signed-in user, including the session token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub avatar: String,
    pub verified: bool,
    pub has_password: bool,
    pub token: String,
}

impl From<&User> for SelfView {
    fn from(u: &User) -> Self {
        Self {
            id: u.key.encode(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            full_name: u.full_name.clone(),
            avatar: u.avatar.clone(),
            verified: u.verified,
            has_password: u.has_password(),
            token: u.token.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub avatar: String,
}

impl From<&UserPartial> for ContactView {
    fn from(p: &UserPartial) -> Self {
        Self {
            id: p.key.encode(),
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            full_name: p.full_name.clone(),
            avatar: p.avatar.clone(),
        }
    }
}

pub fn contacts(partials: &[UserPartial]) -> Vec<ContactView> {
    partials.iter().map(ContactView::from).collect()
}

fn owner(owner: &Option<UserPartial>, key: &Key) -> ContactView {
    owner
        .as_ref()
        .map(ContactView::from)
        .unwrap_or_else(|| ContactView::from(&UserPartial::placeholder(*key)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewView {
    pub body: String,
    pub user: ContactView,
    pub timestamp: DateTime<Utc>,
}

impl From<&MessagePreview> for PreviewView {
    fn from(p: &MessagePreview) -> Self {
        Self {
            body: p.body.clone(),
            user: ContactView::from(&p.sender),
            timestamp: p.timestamp,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub id: String,
    pub owner: ContactView,
    pub users: Vec<ContactView>,
    pub subject: String,
    pub preview: Option<PreviewView>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl ThreadView {
    pub fn new(t: &Thread, viewer: &Key) -> Self {
        Self {
            id: t.key.encode(),
            owner: owner(&t.owner, &t.owner_key),
            users: contacts(&t.users),
            subject: t.subject.clone(),
            preview: t.preview.as_ref().map(PreviewView::from),
            read: t.is_read(viewer),
            created_at: t.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub owner: ContactView,
    pub hosts: Vec<ContactView>,
    pub users: Vec<ContactView>,
    pub rsvps: Vec<ContactView>,
    pub name: String,
    pub description: String,
    pub place_id: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub utc_offset: i32,
    pub formatted_time: String,
    pub guests_can_invite: bool,
    pub read: bool,
}

impl EventView {
    pub fn new(e: &Event, viewer: &Key) -> Self {
        Self {
            id: e.key.encode(),
            owner: owner(&e.owner, &e.owner_key),
            hosts: contacts(&e.hosts),
            users: contacts(&e.users),
            rsvps: contacts(&e.rsvps),
            name: e.name.clone(),
            description: e.description.clone(),
            place_id: e.place.place_id.clone(),
            address: e.place.address.clone(),
            lat: e.place.lat,
            lng: e.place.lng,
            timestamp: e.timestamp,
            utc_offset: e.utc_offset,
            formatted_time: e.get_formatted_time(),
            guests_can_invite: e.guests_can_invite,
            read: e.is_read(viewer),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub parent_id: String,
    pub user: ContactView,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl MessageView {
    pub fn new(m: &Message, viewer: &Key) -> Self {
        Self {
            id: m.key.encode(),
            parent_id: m.parent_key.encode(),
            user: owner(&m.user, &m.user_key),
            body: m.body.clone(),
            timestamp: m.timestamp,
            read: m.is_read(viewer),
        }
    }
}
