use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use convo_shared::magic::MagicLinker;
use convo_shared::{ConvoError, Key, Kind};
use convo_store::{Provider, User};

use super::views::{contacts, ContactView, SelfView};
use super::{AppState, AuthUser, Body};
use crate::error::ApiResult;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    email: String,
    first_name: String,
    #[serde(default)]
    last_name: String,
    password: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    Body(req): Body<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<SelfView>)> {
    let user = User::with_password(&req.email, &req.first_name, &req.last_name, &req.password)?;
    state.db.create_user(&user).await?;
    state.index_user(&user).await;

    if let Err(e) = state.postman.send_verify(&user).await {
        tracing::warn!(user = %user.key, "verification email not sent: {}", e);
    }
    Ok((StatusCode::CREATED, Json(SelfView::from(&user))))
}

#[derive(Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

pub async fn authenticate(
    State(state): State<AppState>,
    Body(req): Body<Credentials>,
) -> ApiResult<Json<SelfView>> {
    match state.db.get_user_by_email(&req.email).await? {
        Some(user) if user.check_password(&req.password) => Ok(Json(SelfView::from(&user))),
        _ => Err(ConvoError::invalid("message", "Invalid email or password").into()),
    }
}

#[derive(Deserialize)]
pub struct OAuthRequest {
    provider: String,
    token: String,
}

pub async fn oauth(
    State(state): State<AppState>,
    Body(req): Body<OAuthRequest>,
) -> ApiResult<Json<SelfView>> {
    let provider = Provider::parse(&req.provider)
        .ok_or_else(|| ConvoError::invalid("provider", "Unsupported provider"))?;
    let profile = state.oauth.verify(provider, &req.token).await?;
    let (user, created) = state.db.get_or_create_oauth_user(&profile).await?;
    if created {
        state.index_user(&user).await;
    }
    Ok(Json(SelfView::from(&user)))
}

pub async fn get_self(AuthUser(user): AuthUser) -> Json<SelfView> {
    Json(SelfView::from(&user))
}

pub async fn get_contacts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<ContactView>>> {
    let partials = state.db.get_contacts(&user).await?;
    Ok(Json(contacts(&partials)))
}

#[derive(Deserialize)]
pub struct ContactRequest {
    id: String,
}

pub async fn add_contact(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Body(req): Body<ContactRequest>,
) -> ApiResult<(StatusCode, Json<Vec<ContactView>>)> {
    let contact = state
        .db
        .get_user(&Key::decode_kind(&req.id, Kind::User)?)
        .await?;
    state.db.add_contact(&mut user, &contact).await?;
    let partials = state.db.get_contacts(&user).await?;
    Ok((StatusCode::CREATED, Json(contacts(&partials))))
}

pub async fn remove_contact(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ContactView>>> {
    let contact = Key::decode_kind(&id, Kind::User)?;
    state.db.remove_contact(&mut user, &contact).await?;
    let partials = state.db.get_contacts(&user).await?;
    Ok(Json(contacts(&partials)))
}

/// Find the user a magic link was issued to and check it against their
/// current secret for `action`.
async fn consume_link(state: &AppState, link: &str, action: &str) -> ApiResult<User> {
    let (id, link_action) = MagicLinker::peek(link).map_err(|_| ConvoError::Unauthorized)?;
    if link_action != action {
        return Err(ConvoError::Unauthorized.into());
    }
    let key = Key::decode_kind(&id, Kind::User).map_err(|_| ConvoError::Unauthorized)?;
    let user = state.db.get_user(&key).await?;
    state
        .postman
        .linker()
        .verify(link, &user.link_secret(action))
        .map_err(|e| {
            tracing::debug!(user = %user.key, action, "magic link refused: {}", e);
            ConvoError::Unauthorized
        })?;
    Ok(user)
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    link: String,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Body(req): Body<VerifyRequest>,
) -> ApiResult<Json<SelfView>> {
    let mut user = consume_link(&state, &req.link, "verify").await?;
    user.verify();
    state.db.put(&user).await?;
    tracing::info!(user = %user.key, "email verified");
    Ok(Json(SelfView::from(&user)))
}

/// Either `{email}` to request a reset link, or `{link, password}` to use one.
#[derive(Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Body(req): Body<ResetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    match (req.email, req.link, req.password) {
        (_, Some(link), Some(password)) => {
            let mut user = consume_link(&state, &link, "reset").await?;
            if !user.change_password(&password) {
                return Err(ConvoError::invalid(
                    "password",
                    "Must be at least 8 characters",
                )
                .into());
            }
            // A reset proves the address and signs out other sessions.
            user.verify();
            user.rotate_token();
            state.db.put(&user).await?;
            tracing::info!(user = %user.key, "password reset");
            Ok(Json(serde_json::to_value(SelfView::from(&user)).map_err(ConvoError::from)?))
        }
        (Some(email), None, None) => {
            if let Some(user) = state.db.get_user_by_email(&email).await? {
                state.postman.send_password_reset(&user).await?;
            }
            Ok(Json(serde_json::json!({
                "message": "If that address has an account, a reset link is on its way"
            })))
        }
        _ => Err(ConvoError::invalid("email", "This field is required").into()),
    }
}
