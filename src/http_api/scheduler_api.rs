use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use super::{ApiResult, AdminAuth, AppState};

pub async fn list_jobs(_admin: AdminAuth, State(state): State<AppState>) -> Json<serde_json::Value> {
    let jobs = state.engine.scheduler.get_jobs().await;
    Json(json!(jobs.iter().map(|j| json!({
        "id": j.id,
        "name": j.name,
        "description": j.description,
        "cron": j.cron,
        "enabled": j.enabled,
        "running": j.running,
        "last_run": j.last_run,
        "last_status": j.last_status.as_ref().map(|r| match r {
            Ok(()) => json!({ "ok": true }),
            Err(e) => json!({ "ok": false, "error": e }),
        }),
        "next_run": j.next_run,
    })).collect::<Vec<_>>()))
}

pub async fn run_job(_admin: AdminAuth, State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state.engine.scheduler.run_job_now(&id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn enable_job(_admin: AdminAuth, State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state.engine.scheduler.enable(&id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn disable_job(_admin: AdminAuth, State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state.engine.scheduler.disable(&id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn cache_stats(_admin: AdminAuth, State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(state.engine.cache_stats()))
}

pub async fn cache_clear(_admin: AdminAuth, State(state): State<AppState>) -> Json<serde_json::Value> {
    state.engine.clear_caches();
    Json(json!({ "success": true }))
}
