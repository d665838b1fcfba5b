mod admin;
mod auth;
mod media;
mod plugin;
mod scheduler_api;
mod webpush_api;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

pub use auth::{AdminAuth, CurrentUser, PluginAuth};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Wraps any engine/adapter failure so it can be turned into the
/// `{"success": false, "error": ...}` envelope of §7 at the boundary.
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<crate::error::EngineError>() {
            Some(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "success": false, "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Builds the full route table (§6). Template/session-owning routes have no
/// server-rendered view in this crate and are stubbed `501`.
pub fn router(engine: Arc<Engine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/", get(stub))
        .route("/login", get(stub))
        .route("/logout", get(stub))
        .route("/auth/jellyfin/login", post(stub))
        .route("/auth/oidc/login", get(stub))
        .route("/auth/oidc/callback", get(stub))
        .route("/admin/", get(stub))
        .route("/api/me", get(media::me))
        .route("/api/media", get(media::list_media))
        .route("/api/media/{id}/request-keep", post(media::request_keep))
        .route("/api/images/cache", get(media::image_cache))
        .route("/api/webpush/vapid-key", get(webpush_api::vapid_key))
        .route("/api/webpush/subscribe", post(webpush_api::subscribe))
        .route("/api/webpush/unsubscribe", post(webpush_api::unsubscribe))
        .route("/admin/api/keep-requests", get(admin::list_keep_requests))
        .route("/admin/api/keep-requests/{id}/accept", post(admin::accept_keep_request))
        .route("/admin/api/keep-requests/{id}/decline", post(admin::decline_keep_request))
        .route("/admin/api/media", get(admin::list_media))
        .route("/admin/api/media/{id}/keep", post(admin::keep_media))
        .route("/admin/api/media/{id}/delete", post(admin::delete_media))
        .route("/admin/api/media/{id}/keep-forever", post(admin::keep_media_forever))
        .route("/admin/api/scheduler/jobs", get(scheduler_api::list_jobs))
        .route("/admin/api/scheduler/jobs/{id}/run", post(scheduler_api::run_job))
        .route("/admin/api/scheduler/jobs/{id}/enable", post(scheduler_api::enable_job))
        .route("/admin/api/scheduler/jobs/{id}/disable", post(scheduler_api::disable_job))
        .route("/admin/api/scheduler/cache/stats", get(scheduler_api::cache_stats))
        .route("/admin/api/scheduler/cache/clear", post(scheduler_api::cache_clear))
        .route("/admin/api/history", get(admin::history))
        .route("/plugin/health", get(plugin::health))
        .route("/plugin/check", post(plugin::check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Template/session routes this crate doesn't render (§1 Non-goals).
async fn stub() -> Response {
    (StatusCode::NOT_IMPLEMENTED, Json(json!({ "success": false, "error": "not implemented" }))).into_response()
}
