use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::EngineError;
use crate::notify::PushSubscription;
use crate::store::PushSubscriptionRow;

use super::{ApiResult, AppState, CurrentUser};

pub async fn vapid_key(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let webpush = state
        .engine
        .config
        .webpush
        .as_ref()
        .ok_or_else(|| EngineError::ConfigMissing("webpush".into()))?;
    Ok(Json(json!({ "public_key": webpush.vapid_public_key })))
}

pub async fn subscribe(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(sub): Json<PushSubscription>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .engine
        .store
        .add_push_subscription(PushSubscriptionRow {
            username: user.username,
            endpoint: sub.endpoint,
            p256dh: sub.p256dh,
            auth: sub.auth,
        })
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct UnsubscribeRequest {
    endpoint: String,
}

pub async fn unsubscribe(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<UnsubscribeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.store.remove_push_subscription(&user.username, &body.endpoint).await?;
    Ok(Json(json!({ "success": true })))
}
