use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::store::MediaState;

use super::{ApiError, AppState, PluginAuth};

pub async fn health(_auth: PluginAuth) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct CheckRequest {
    name: String,
    production_year: Option<i32>,
    media_type: String,
}

/// `POST /plugin/check` (§6/§8): a media-request plugin asking whether an
/// item it's about to re-request is already scheduled for cleanup, so it
/// can warn the requester instead of silently re-downloading something
/// about to be deleted again.
pub async fn check(_auth: PluginAuth, State(state): State<AppState>, Json(body): Json<CheckRequest>) -> Result<Response, ApiError> {
    let expected_library_kind = match body.media_type.as_str() {
        "series" | "show" | "tv" => "series",
        _ => "movie",
    };

    let items = state.engine.store.get_media_items().await?;
    let found = items.into_iter().find(|m| {
        m.state == MediaState::Pending
            && m.title.eq_ignore_ascii_case(&body.name)
            && m.year == body.production_year
            && m.media_ref.kind() == expected_library_kind
    });

    match found {
        Some(media) => Ok(Json(json!({ "deletion_date": media.default_delete_at })).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "success": false, "error": "not scheduled for cleanup" }))).into_response()),
    }
}
