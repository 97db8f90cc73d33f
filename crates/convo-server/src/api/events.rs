use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use convo_mail::Verb;
use convo_shared::{ConvoError, Key, Kind, Pagination};
use convo_store::{Event, EventDraft, Place, User};

use super::threads::MessageRequest;
use super::views::{EventView, MessageView};
use super::{AppState, AuthUser, Body, UserRef};
use crate::error::ApiResult;

/// An event the user is invited to. Anything else is reported as missing.
async fn load(state: &AppState, id: &str, user: &User) -> ApiResult<Event> {
    let event = state.db.get_event(&Key::decode_kind(id, Kind::Event)?).await?;
    if !event.has_user(&user.key) {
        return Err(ConvoError::NotFound("Event not found".into()).into());
    }
    Ok(event)
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<EventView>>> {
    let events = state.db.get_events_by_user(&user).await?;
    Ok(Json(events.iter().map(|e| EventView::new(e, &user.key)).collect()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    place_id: Option<String>,
    timestamp: DateTime<Utc>,
    /// Seconds east of UTC; ignored when a place supplies its own.
    #[serde(default)]
    utc_offset: i32,
    #[serde(default)]
    hosts: Vec<UserRef>,
    #[serde(default)]
    users: Vec<UserRef>,
    #[serde(default)]
    guests_can_invite: bool,
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Body(req): Body<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<EventView>)> {
    let (place, utc_offset) = match req.place_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => {
            let place = state.places.place_details(id).await?;
            let offset = place.utc_offset;
            (place, offset)
        }
        None => (Place::default(), req.utc_offset),
    };
    let hosts = state.resolve_users(&req.hosts).await?;
    let users = state.resolve_users(&req.users).await?;

    let event = Event::new(
        EventDraft {
            name: req.name,
            description: req.description,
            place,
            timestamp: req.timestamp,
            utc_offset,
            guests_can_invite: req.guests_can_invite,
        },
        &user,
        &hosts,
        &users,
    )?;
    state.db.create_event(&event).await?;
    let event = state.db.get_event(&event.key).await?;

    if let Err(e) = state.postman.send_invites_async(&event).await {
        tracing::warn!(event = %event.key, "invites not queued: {}", e);
    }
    state
        .notify(&event.user_keys, &user.key, Verb::NewEvent, &event.key, &event.name)
        .await;
    state
        .search
        .update(&event.key, serde_json::json!({ "name": event.name }))
        .await;
    Ok((StatusCode::CREATED, Json(EventView::new(&event, &user.key))))
}

pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<EventView>> {
    let event = load(&state, &id, &user).await?;
    Ok(Json(EventView::new(&event, &user.key)))
}

#[derive(Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    message: String,
}

/// Cancel: guests are emailed first, then the event document goes.
pub async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<CancelParams>,
) -> ApiResult<Json<EventView>> {
    let event = load(&state, &id, &user).await?;
    if !event.owner_is(&user.key) {
        return Err(ConvoError::Forbidden("Only the owner can cancel this event".into()).into());
    }
    match state.postman.send_cancellation(&event, &params.message).await {
        Ok(report) if report.failed.is_empty() => {}
        Ok(report) => tracing::warn!(event = %event.key, failed = report.failed.len(), "some cancellations not sent"),
        Err(e) => tracing::warn!(event = %event.key, "cancellations not sent: {}", e),
    }
    state.db.delete_event(&event).await?;
    state.search.delete(&event.key).await;
    Ok(Json(EventView::new(&event, &user.key)))
}

/// Notify the owner and hosts about a change in who is coming.
async fn notify_hosts(state: &AppState, event: &Event, actor: &Key, verb: Verb) {
    let mut recipients = vec![event.owner_key];
    recipients.extend(event.host_keys.iter().copied());
    state.notify(&recipients, actor, verb, &event.key, &event.name).await;
}

pub async fn add_rsvp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<EventView>> {
    let event = load(&state, &id, &user).await?;
    let updated = state.db.add_rsvp_with_transaction(&event.key, &user).await?;
    notify_hosts(&state, &updated, &user.key, Verb::AddRsvp).await;
    let event = state.db.get_event(&updated.key).await?;
    Ok(Json(EventView::new(&event, &user.key)))
}

pub async fn remove_rsvp(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<EventView>> {
    let event = load(&state, &id, &user).await?;
    let updated = state
        .db
        .remove_rsvp_with_transaction(&event.key, &user.key)
        .await?;
    notify_hosts(&state, &updated, &user.key, Verb::RemoveRsvp).await;
    let event = state.db.get_event(&updated.key).await?;
    Ok(Json(EventView::new(&event, &user.key)))
}

pub async fn add_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, uid)): Path<(String, String)>,
) -> ApiResult<Json<EventView>> {
    let mut event = load(&state, &id, &user).await?;
    if !event.can_invite(&user.key) {
        return Err(ConvoError::Forbidden("You cannot invite guests to this event".into()).into());
    }
    let guest = state.db.get_user(&Key::decode_kind(&uid, Kind::User)?).await?;
    event.add_user(&guest)?;
    state.db.update_event(&event).await?;

    if let Err(e) = state.postman.send_invite_to_user_async(&event, &guest).await {
        tracing::warn!(event = %event.key, user = %guest.key, "invite not queued: {}", e);
    }
    state
        .notify(&[guest.key], &user.key, Verb::NewEvent, &event.key, &event.name)
        .await;
    Ok(Json(EventView::new(&event, &user.key)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let event = load(&state, &id, &user).await?;
    let messages = state.db.get_messages_by_parent_paged(&event.key, page).await?;
    Ok(Json(messages.iter().map(|m| MessageView::new(m, &user.key)).collect()))
}

pub async fn add_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Body(req): Body<MessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    let mut event = load(&state, &id, &user).await?;
    let message = state
        .db
        .add_event_message(&user, &mut event, &req.message)
        .await?;
    state
        .notify(&event.user_keys, &user.key, Verb::NewMessage, &event.key, &event.name)
        .await;
    Ok((StatusCode::CREATED, Json(MessageView::new(&message, &user.key))))
}

pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<EventView>> {
    let mut event = load(&state, &id, &user).await?;
    state.db.mark_event_read(&mut event, &user.key).await?;
    Ok(Json(EventView::new(&event, &user.key)))
}
