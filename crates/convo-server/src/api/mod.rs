//! HTTP boundary.
//!
//! Handlers authenticate, call one or two `Database`/`Postman` operations
//! and map the outcome through [`ApiError`].

mod admin;
mod events;
mod threads;
mod users;
mod views;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use convo_mail::{notify, Activity, Notifier, Postman, Verb};
use convo_shared::{ConvoError, Key, Kind};
use convo_store::{Database, MergeLocks, User};

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::oauth::OAuthVerifier;
use crate::places::PlaceResolver;
use crate::search::SearchIndex;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub postman: Arc<Postman>,
    pub notifier: Arc<dyn Notifier>,
    pub oauth: Arc<dyn OAuthVerifier>,
    pub places: Arc<dyn PlaceResolver>,
    pub search: Arc<dyn SearchIndex>,
    pub merge_locks: Arc<MergeLocks>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Post an activity to every recipient's feed. Feed failures are
    /// logged inside `notify` and never fail the request.
    pub async fn notify(&self, recipients: &[Key], actor: &Key, verb: Verb, target: &Key, name: &str) {
        let activity = Activity::new(actor, verb, target, name);
        notify(self.notifier.as_ref(), recipients, &activity).await;
    }

    pub async fn index_user(&self, user: &User) {
        let doc = serde_json::json!({
            "id": user.key.encode(),
            "fullName": user.full_name,
            "email": user.email,
        });
        self.search.update(&user.key, doc).await;
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/users", get(users::get_self).post(users::create_user))
        .route("/users/auth", post(users::authenticate))
        .route("/users/oauth", post(users::oauth))
        .route("/users/contacts", get(users::get_contacts).post(users::add_contact))
        .route("/users/contacts/:id", delete(users::remove_contact))
        .route("/users/verify", post(users::verify_email))
        .route("/users/reset-password", post(users::reset_password))
        .route("/threads", get(threads::list).post(threads::create))
        .route("/threads/:id", get(threads::get_one).delete(threads::delete_one))
        .route(
            "/threads/:id/users/:uid",
            post(threads::add_user).delete(threads::remove_user),
        )
        .route(
            "/threads/:id/messages",
            get(threads::get_messages).post(threads::add_message),
        )
        .route("/threads/:id/reads", post(threads::mark_read))
        .route("/events", get(events::list).post(events::create))
        .route("/events/:id", get(events::get_one).delete(events::delete_one))
        .route(
            "/events/:id/rsvps",
            post(events::add_rsvp).delete(events::remove_rsvp),
        )
        .route("/events/:id/users/:uid", post(events::add_user))
        .route(
            "/events/:id/messages",
            get(events::get_messages).post(events::add_message),
        )
        .route("/events/:id/reads", post(events::mark_read))
        .route("/admin/merge", post(admin::merge))
        .route("/admin/digests", post(admin::digests))
        .layer(middleware::from_fn_with_state(
            state.config.request_timeout,
            request_timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Drop the handler future once the deadline passes. Writes already
/// issued stay; nothing is rolled back.
async fn request_timeout(State(limit): State<Duration>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, timeout_secs = limit.as_secs(), "request timed out");
            ApiError(ConvoError::Internal(format!("{path} timed out"))).into_response()
        }
    }
}

// ─── Extractors ───

/// The user behind `Authorization: Bearer <session token>`.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(&parts.headers).ok_or(ApiError(ConvoError::Unauthorized))?;
        let user = state
            .db
            .get_user_by_token(token)
            .await?
            .ok_or(ApiError(ConvoError::Unauthorized))?;
        Ok(AuthUser(user))
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// JSON request body whose rejections go through the error model:
/// a missing JSON content type is 415, anything else a field error.
pub struct Body<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Body(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => {
                Err(ApiError(ConvoError::UnsupportedMedia))
            }
            Err(e) => Err(ApiError(ConvoError::invalid("body", e.body_text()))),
        }
    }
}

/// Someone referenced in a create or invite request: an existing user by
/// id, or anyone by email.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl AppState {
    pub async fn resolve_users(&self, refs: &[UserRef]) -> ApiResult<Vec<User>> {
        let mut users = Vec::with_capacity(refs.len());
        for r in refs {
            let user = match (&r.id, &r.email) {
                (Some(id), _) => self.db.get_user(&Key::decode_kind(id, Kind::User)?).await?,
                (None, Some(email)) => {
                    self.db
                        .get_or_create_invited_user(email, &r.first_name, &r.last_name)
                        .await?
                }
                (None, None) => {
                    return Err(ConvoError::invalid("users", "Each user needs an id or an email").into())
                }
            };
            users.push(user);
        }
        Ok(users)
    }
}

// ─── Admin auth ───

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> ApiResult<()> {
    let Some(ref expected) = config.admin_token else {
        return Err(ConvoError::Forbidden("Admin API is disabled".into()).into());
    };

    let token = bearer(headers).unwrap_or("");

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ConvoError::Forbidden("Invalid admin token".into()).into());
    }

    Ok(())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
