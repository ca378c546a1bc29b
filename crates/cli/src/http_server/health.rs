use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use vault_backup_core::BackupCycleResult;
use vault_core::ChangeState;

use super::SharedContext;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub vault: String,
    pub uptime_seconds: u64,
    pub dry_run: bool,
    pub backup_running: bool,
    pub accepting: bool,
    pub state: ChangeState,
    pub last_result: Option<BackupCycleResult>,
}

/// Liveness plus the persisted markers
///
/// Always 200 while the process serves requests.
#[tracing::instrument(skip(ctx))]
pub async fn handler(State(ctx): State<SharedContext>) -> Response {
    let response = HealthResponse {
        status: "ok",
        vault: ctx.settings.vault_path.display().to_string(),
        uptime_seconds: ctx.started.elapsed().as_secs(),
        dry_run: ctx.settings.dry_run,
        backup_running: ctx.guard.is_running(),
        accepting: ctx.guard.is_accepting(),
        state: ctx.state.snapshot(),
        last_result: ctx.guard.last_result(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness: 503 once shutdown has begun
#[tracing::instrument(skip(ctx))]
pub async fn ready(State(ctx): State<SharedContext>) -> Response {
    if ctx.guard.is_accepting() {
        (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "shutting_down"})),
        )
            .into_response()
    }
}
