use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use vault_backup_core::TriggerOutcome;
use vault_watcher::TriggerSource;

use super::error::ApiError;
use super::SharedContext;

/// Manual backup trigger
///
/// The cycle runs on its own task so a disconnecting client cannot cancel
/// it halfway through a commit.
#[tracing::instrument(skip(ctx))]
pub async fn handler(State(ctx): State<SharedContext>) -> Result<Response, ApiError> {
    let guard = ctx.guard.clone();
    let outcome = tokio::spawn(async move { guard.try_run(TriggerSource::Manual).await })
        .await
        .map_err(|e| ApiError::Internal(format!("backup task failed: {}", e)))?;

    let response = match outcome {
        TriggerOutcome::Completed(result) => (StatusCode::OK, Json(result)).into_response(),
        TriggerOutcome::Busy => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": "backup already in progress"})),
        )
            .into_response(),
        TriggerOutcome::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "shutting down"})),
        )
            .into_response(),
    };
    Ok(response)
}
