// HTTP surface under /api

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path as UrlPath, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::downloader::errors::JobError;
use crate::downloader::format_selector::{QualityOption, QUALITY_OPTIONS};
use crate::downloader::models::VideoMetadata;
use crate::jobs::{JobManager, StartedDownload, StatusReport};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Validation and lookup errors keep their own status; anything else is
    /// reported as a 500 with `context` in front of the message.
    fn from_job(err: JobError, context: &str) -> Self {
        match err {
            JobError::Validation(message) => Self::bad_request(message),
            JobError::NotFound(message) => Self::not_found(message),
            other => Self::internal(format!("{context}: {other}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VideoInfoRequest {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DownloadRequest {
    pub url: String,
    /// Any JSON value; anything but a known selector string means `auto`
    pub quality: Option<serde_json::Value>,
    pub audio_only: bool,
}

#[derive(Serialize)]
pub struct QualitiesResponse {
    qualities: &'static [QualityOption],
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/video-info", post(video_info))
        .route("/api/download", post(start_download))
        .route("/api/status/{id}", get(download_status))
        .route("/api/file/{id}", get(download_file))
        .route("/api/cleanup/{id}", delete(cleanup_download))
        .route("/api/qualities", get(qualities))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn video_info(
    State(state): State<AppState>,
    payload: Result<Json<VideoInfoRequest>, JsonRejection>,
) -> Result<Json<VideoMetadata>, ApiError> {
    let Json(payload) = payload?;
    state
        .manager
        .video_info(&payload.url)
        .await
        .map(Json)
        .map_err(|err| ApiError::from_job(err, "Failed to extract video info"))
}

async fn start_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<StartedDownload>, ApiError> {
    let Json(payload) = payload?;
    state
        .manager
        .start_download(
            &payload.url,
            payload.quality.as_ref().and_then(|q| q.as_str()),
            payload.audio_only,
        )
        .await
        .map(Json)
        .map_err(|err| ApiError::from_job(err, "Failed to start download"))
}

async fn download_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<StatusReport>, ApiError> {
    state
        .manager
        .status(&id)
        .map(Json)
        .map_err(|_| ApiError::not_found("Download not found"))
}

async fn download_file(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response, ApiError> {
    let retrieved = state
        .manager
        .retrieve(&id)
        .await
        .map_err(|err| ApiError::from_job(err, "Failed to read file"))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(&retrieved.filename)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(retrieved.size));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&retrieved.filename))
            .map_err(|_| ApiError::internal("Invalid file name"))?,
    );

    let body = Body::from_stream(ReaderStream::new(retrieved.file));
    Ok((headers, body).into_response())
}

async fn cleanup_download(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .manager
        .cleanup_now(&id)
        .await
        .map_err(|err| ApiError::internal(format!("Cleanup failed: {err}")))?;
    Ok(Json(serde_json::json!({"message": "Cleanup completed"})))
}

async fn qualities() -> Json<QualitiesResponse> {
    Json(QualitiesResponse {
        qualities: &QUALITY_OPTIONS,
    })
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitize_ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download".to_string()
    } else {
        compact.to_string()
    }
}
