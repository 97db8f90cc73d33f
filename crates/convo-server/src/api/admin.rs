use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use convo_shared::{Key, Kind};
use convo_store::MergeReport;

use super::{verify_admin_token, AppState, Body};
use crate::error::ApiResult;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    old_user_id: String,
    new_user_id: String,
}

/// Fold one account into another, then remove the old account.
pub async fn merge(
    headers: HeaderMap,
    State(state): State<AppState>,
    Body(req): Body<MergeRequest>,
) -> ApiResult<Json<MergeReport>> {
    verify_admin_token(&headers, &state.config)?;

    let old = state
        .db
        .get_user(&Key::decode_kind(&req.old_user_id, Kind::User)?)
        .await?;
    let new = state
        .db
        .get_user(&Key::decode_kind(&req.new_user_id, Kind::User)?)
        .await?;

    let _guard = state.merge_locks.acquire(&old.key, &new.key)?;
    let report = state.db.merge_users(&old, &new).await?;
    state.db.delete(&old.key).await?;
    state.search.delete(&old.key).await;
    if let Ok(merged) = state.db.get_user(&new.key).await {
        state.index_user(&merged).await;
    }

    tracing::info!(old = %old.key, new = %new.key, ?report, "Admin merged users");
    Ok(Json(report))
}

pub async fn digests(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    verify_admin_token(&headers, &state.config)?;
    let sent = state.postman.send_digests().await?;
    tracing::info!(sent, "Admin triggered digests");
    Ok(Json(serde_json::json!({ "sent": sent })))
}
