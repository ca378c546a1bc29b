//! Restore browsing page and the JSON endpoints behind it

use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use vault_vcs::{vault_relative, RestoreOrigin, RestoredFile};

use super::error::{required, ApiError};
use super::SharedContext;
use crate::diff_utils::is_binary;

const DEFAULT_LOG_COUNT: usize = 50;
const MAX_LOG_COUNT: usize = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotsQuery {
    pub tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilesQuery {
    pub snapshot: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub file: Option<String>,
    pub count: Option<usize>,
}

/// `source` + `path`, shared by preview, download and restore
#[derive(Debug, Default, Deserialize)]
pub struct FileRef {
    pub source: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub origin: RestoreOrigin,
    /// "git commit" or "restic snapshot"
    pub label: &'static str,
    pub source: String,
    pub path: String,
    pub size: usize,
    pub binary: bool,
    /// Text content; omitted for binary files
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    #[serde(flatten)]
    pub restored: RestoredFile,
    pub label: &'static str,
}

/// Browser page with snapshots, history and preview tabs
///
/// The page script fetches the JSON endpoints below and renders every
/// value with `textContent`.
#[derive(Template)]
#[template(path = "ui.html")]
pub struct UiPage {
    pub vault: String,
    pub tag: String,
}

/// GET /ui
pub async fn page(State(ctx): State<SharedContext>) -> Response {
    UiPage {
        vault: ctx.settings.vault_path.display().to_string(),
        tag: ctx.settings.restic_tag.clone(),
    }
    .into_response()
}

/// GET /ui/snapshots
pub async fn snapshots(
    State(ctx): State<SharedContext>,
    Query(query): Query<SnapshotsQuery>,
) -> Result<Response, ApiError> {
    let tag = query
        .tag
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| ctx.settings.restic_tag.clone());

    let snapshots = ctx.snapshots().list_snapshots(Some(tag.as_str())).await?;
    Ok(Json(snapshots).into_response())
}

/// GET /ui/files?snapshot=&path=
pub async fn files(
    State(ctx): State<SharedContext>,
    Query(query): Query<FilesQuery>,
) -> Result<Response, ApiError> {
    let snapshot = required(&query.snapshot, "snapshot")?;

    let entries = ctx
        .snapshots()
        .list_files(snapshot, query.path.as_deref())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("snapshot not found: {}", snapshot)))?;

    Ok(Json(entries).into_response())
}

/// GET /ui/log?file=&count=
pub async fn log(
    State(ctx): State<SharedContext>,
    Query(query): Query<LogQuery>,
) -> Result<Response, ApiError> {
    let count = query
        .count
        .unwrap_or(DEFAULT_LOG_COUNT)
        .clamp(1, MAX_LOG_COUNT);

    let commits = match query.file.as_deref().filter(|f| !f.is_empty()) {
        Some(file) => {
            let relative = vault_relative(&ctx.settings.vault_path, file)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            ctx.vcs()
                .file_history(&relative.to_string_lossy(), count)
                .await?
        }
        None => ctx.vcs().log(count).await?,
    };

    Ok(Json(commits).into_response())
}

/// GET /ui/preview?source=&path=
pub async fn preview(
    State(ctx): State<SharedContext>,
    Query(file): Query<FileRef>,
) -> Result<Response, ApiError> {
    let source = required(&file.source, "source")?;
    let path = required(&file.path, "path")?;

    let fetched = ctx.restore.fetch(source, path).await?;
    let binary = is_binary(&fetched.content);

    let response = PreviewResponse {
        origin: fetched.origin,
        label: fetched.origin.label(),
        source: fetched.source,
        path: fetched.path.to_string_lossy().into_owned(),
        size: fetched.content.len(),
        binary,
        content: (!binary).then(|| String::from_utf8_lossy(&fetched.content).into_owned()),
    };
    Ok(Json(response).into_response())
}

/// GET /ui/download?source=&path=
pub async fn download(
    State(ctx): State<SharedContext>,
    Query(file): Query<FileRef>,
) -> Result<Response, ApiError> {
    let source = required(&file.source, "source")?;
    let path = required(&file.path, "path")?;

    let fetched = ctx.restore.fetch(source, path).await?;
    let filename = fetched
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .replace('"', "");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        fetched.content,
    )
        .into_response())
}

/// POST /ui/restore (form: source, path)
///
/// Restores over the live vault file; the watcher then picks the restored
/// content up like any other edit.
pub async fn restore(
    State(ctx): State<SharedContext>,
    Form(file): Form<FileRef>,
) -> Result<Response, ApiError> {
    let source = required(&file.source, "source")?;
    let path = required(&file.path, "path")?;

    let restored = ctx.restore.restore(source, path, None).await?;
    let label = restored.origin.label();

    Ok(Json(RestoreResponse { restored, label }).into_response())
}
