use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use convo_mail::Verb;
use convo_shared::{ConvoError, Key, Kind, Pagination};
use convo_store::{Thread, User};

use super::views::{MessageView, ThreadView};
use super::{AppState, AuthUser, Body, UserRef};
use crate::error::ApiResult;

/// A thread the user takes part in. Anything else is reported as missing.
async fn load(state: &AppState, id: &str, user: &User) -> ApiResult<Thread> {
    let thread = state.db.get_thread(&Key::decode_kind(id, Kind::Thread)?).await?;
    if !thread.has_user(&user.key) {
        return Err(ConvoError::NotFound("Thread not found".into()).into());
    }
    Ok(thread)
}

fn require_owner(thread: &Thread, user: &User) -> ApiResult<()> {
    if !thread.owner_is(&user.key) {
        return Err(ConvoError::Forbidden("You do not own this thread".into()).into());
    }
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<ThreadView>>> {
    let threads = state.db.get_threads_by_user(&user).await?;
    Ok(Json(threads.iter().map(|t| ThreadView::new(t, &user.key)).collect()))
}

#[derive(Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    users: Vec<UserRef>,
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Body(req): Body<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<ThreadView>)> {
    let members = state.resolve_users(&req.users).await?;
    let created = state.db.create_thread(&req.subject, &user, &members).await?;
    let thread = state.db.get_thread(&created.key).await?;
    state
        .search
        .update(&thread.key, serde_json::json!({ "subject": thread.subject }))
        .await;
    Ok((StatusCode::CREATED, Json(ThreadView::new(&thread, &user.key))))
}

pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ThreadView>> {
    let thread = load(&state, &id, &user).await?;
    Ok(Json(ThreadView::new(&thread, &user.key)))
}

pub async fn delete_one(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ThreadView>> {
    let thread = load(&state, &id, &user).await?;
    require_owner(&thread, &user)?;
    state.db.delete_thread(&thread).await?;
    state.search.delete(&thread.key).await;
    Ok(Json(ThreadView::new(&thread, &user.key)))
}

pub async fn add_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, uid)): Path<(String, String)>,
) -> ApiResult<Json<ThreadView>> {
    let mut thread = load(&state, &id, &user).await?;
    require_owner(&thread, &user)?;
    let mut member = state.db.get_user(&Key::decode_kind(&uid, Kind::User)?).await?;
    if !state.db.add_user_to_thread(&mut thread, &mut member).await? {
        return Err(ConvoError::Conflict("This user is already in the thread".into()).into());
    }
    let thread = state.db.get_thread(&thread.key).await?;
    Ok(Json(ThreadView::new(&thread, &user.key)))
}

/// Owners remove anyone but themselves; members may only leave.
pub async fn remove_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, uid)): Path<(String, String)>,
) -> ApiResult<Json<ThreadView>> {
    let mut thread = load(&state, &id, &user).await?;
    let target = Key::decode_kind(&uid, Kind::User)?;
    if target != user.key {
        require_owner(&thread, &user)?;
    }
    let mut member = state.db.get_user(&target).await?;
    state.db.remove_user_from_thread(&mut thread, &mut member).await?;
    let thread = state.db.get_thread(&thread.key).await?;
    Ok(Json(ThreadView::new(&thread, &user.key)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let thread = load(&state, &id, &user).await?;
    let messages = state.db.get_messages_by_parent_paged(&thread.key, page).await?;
    Ok(Json(messages.iter().map(|m| MessageView::new(m, &user.key)).collect()))
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

pub async fn add_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Body(req): Body<MessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    let mut thread = load(&state, &id, &user).await?;
    let message = state
        .db
        .add_thread_message(&user, &mut thread, &req.message)
        .await?;

    if let Err(e) = state.postman.send_thread_async(&thread).await {
        tracing::warn!(thread = %thread.key, "thread email not queued: {}", e);
    }
    state
        .notify(
            &thread.participant_keys(),
            &user.key,
            Verb::NewMessage,
            &thread.key,
            &thread.subject,
        )
        .await;
    Ok((StatusCode::CREATED, Json(MessageView::new(&message, &user.key))))
}

pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ThreadView>> {
    let mut thread = load(&state, &id, &user).await?;
    state.db.mark_thread_read(&mut thread, &user.key).await?;
    Ok(Json(ThreadView::new(&thread, &user.key)))
}
