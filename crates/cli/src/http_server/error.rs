use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use vault_vcs::{RestoreError, ToolError};

/// Errors surfaced by HTTP handlers
///
/// Every variant maps to a status code and a `{"error": ...}` body; nothing
/// here takes the server down.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// git or restic failed
    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Tool(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RestoreError> for ApiError {
    fn from(err: RestoreError) -> Self {
        match err {
            RestoreError::InvalidPath(_) | RestoreError::InvalidSource(_) => {
                ApiError::BadRequest(err.to_string())
            }
            RestoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            RestoreError::Tool(e) => ApiError::Tool(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Require a non-empty query or form parameter
pub fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParameter(name))
}
