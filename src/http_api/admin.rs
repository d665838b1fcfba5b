use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::domain::MediaRef;
use crate::engine::keep_requests;
use crate::error::EngineError;
use crate::notify::PushSubscription;
use crate::store::Media;

use super::{ApiResult, AdminAuth, AppState};

async fn labels_for(state: &AppState, media_ref: MediaRef) -> anyhow::Result<Vec<String>> {
    let client = keep_requests::resolve_client(media_ref, state.engine.sonarr.as_ref(), state.engine.radarr.as_ref());
    keep_requests::current_labels(client, media_ref.id()).await
}

async fn require_media(state: &AppState, media_ref: MediaRef) -> ApiResult<Media> {
    state
        .engine
        .store
        .get_media_item_by_ref(media_ref)
        .await?
        .ok_or_else(|| EngineError::ValidationFailed(format!("no such media item: {media_ref}")).into())
}

async fn subscription_for(state: &AppState, username: &str) -> Option<PushSubscription> {
    state
        .engine
        .store
        .get_push_subscriptions(username)
        .await
        .ok()?
        .into_iter()
        .next()
        .map(|row| PushSubscription { endpoint: row.endpoint, p256dh: row.p256dh, auth: row.auth })
}

pub async fn list_keep_requests(_admin: AdminAuth, State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let media = keep_requests::list_keep_requests(state.engine.store.as_ref(), false).await?;
    Ok(Json(json!(media.iter().map(media_json).collect::<Vec<_>>())))
}

pub async fn accept_keep_request(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_ref: MediaRef = id.parse()?;
    let media = require_media(&state, media_ref).await?;
    let labels = labels_for(&state, media_ref).await?;
    let subscription = match &media.requested_by {
        Some(username) => subscription_for(&state, username).await,
        None => None,
    };

    keep_requests::accept_keep_request(
        media_ref,
        &media,
        &labels,
        state.engine.sonarr.as_ref(),
        state.engine.radarr.as_ref(),
        state.engine.store.as_ref(),
        &state.engine.notifier,
        subscription.as_ref(),
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn decline_keep_request(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_ref: MediaRef = id.parse()?;
    let media = require_media(&state, media_ref).await?;
    let labels = labels_for(&state, media_ref).await?;
    let subscription = match &media.requested_by {
        Some(username) => subscription_for(&state, username).await,
        None => None,
    };

    keep_requests::decline_keep_request(
        media_ref,
        &labels,
        state.engine.sonarr.as_ref(),
        state.engine.radarr.as_ref(),
        state.engine.store.as_ref(),
        &state.engine.notifier,
        subscription.as_ref(),
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct KeepBody {
    #[serde(default = "default_keep_days")]
    days: i64,
}

fn default_keep_days() -> i64 {
    90
}

pub async fn keep_media(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<KeepBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_ref: MediaRef = id.parse()?;
    let labels = labels_for(&state, media_ref).await?;
    keep_requests::admin_keep(
        media_ref,
        &labels,
        body.days,
        state.engine.sonarr.as_ref(),
        state.engine.radarr.as_ref(),
        state.engine.store.as_ref(),
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_media(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_ref: MediaRef = id.parse()?;
    let labels = labels_for(&state, media_ref).await?;
    keep_requests::admin_delete(
        media_ref,
        &labels,
        state.engine.sonarr.as_ref(),
        state.engine.radarr.as_ref(),
        state.engine.store.as_ref(),
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn keep_media_forever(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_ref: MediaRef = id.parse()?;
    let labels = labels_for(&state, media_ref).await?;
    keep_requests::mark_keep_forever(
        media_ref,
        &labels,
        state.engine.sonarr.as_ref(),
        state.engine.radarr.as_ref(),
        state.engine.store.as_ref(),
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_media(_admin: AdminAuth, State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let media = state.engine.store.get_media_items().await?;
    Ok(Json(json!(media.iter().map(media_json).collect::<Vec<_>>())))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn history(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let runs = state.engine.store.get_cleanup_run_history(query.limit, query.offset).await?;
    Ok(Json(json!(runs.iter().map(|r| json!({
        "id": r.id,
        "started_at": r.started_at,
        "finished_at": r.finished_at,
        "status": format!("{:?}", r.status),
    })).collect::<Vec<_>>())))
}

fn media_json(m: &Media) -> serde_json::Value {
    json!({
        "id": m.media_ref.to_string(),
        "title": m.title,
        "library": m.library,
        "year": m.year,
        "poster_url": m.poster_url,
        "size_on_disk": m.size_on_disk,
        "default_delete_at": m.default_delete_at,
        "protected_until": m.protected_until,
        "requested_by": m.requested_by,
        "state": format!("{:?}", m.state),
    })
}
