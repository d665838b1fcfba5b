use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::http::{header, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::domain::MediaRef;
use crate::engine::keep_requests;
use crate::store::MediaState;

use super::{ApiError, ApiResult, AppState, CurrentUser};

pub async fn me(user: CurrentUser) -> Json<serde_json::Value> {
    Json(json!({ "username": user.username }))
}

/// `GET /api/media` (§6): the items currently scheduled for cleanup across
/// every library, so any authenticated user can decide whether to request
/// to keep one. Per-user filtering happens on accept/decline, not here —
/// the pending set is shared dashboard state, not private to the caller.
pub async fn list_media(_user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let items = state.engine.store.get_media_items().await?;
    let pending: Vec<_> = items.into_iter().filter(|m| m.state == MediaState::Pending).collect();
    Ok(Json(json!(pending.iter().map(media_json).collect::<Vec<_>>())))
}

pub async fn request_keep(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_ref: MediaRef = id.parse()?;
    let client = keep_requests::resolve_client(media_ref, state.engine.sonarr.as_ref(), state.engine.radarr.as_ref());
    let labels = keep_requests::current_labels(client, media_ref.id()).await?;

    keep_requests::request_keep(
        media_ref,
        &labels,
        &user.username,
        state.engine.sonarr.as_ref(),
        state.engine.radarr.as_ref(),
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct ImageCacheQuery {
    url: String,
}

pub async fn image_cache(
    _user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ImageCacheQuery>,
) -> Result<Response, ApiError> {
    let bytes = state.engine.image_cache.fetch(&query.url).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

fn media_json(m: &crate::store::Media) -> serde_json::Value {
    json!({
        "id": m.media_ref.to_string(),
        "title": m.title,
        "library": m.library,
        "year": m.year,
        "poster_url": m.poster_url,
        "size_on_disk": m.size_on_disk,
        "default_delete_at": m.default_delete_at,
        "requested_by": m.requested_by,
    })
}
