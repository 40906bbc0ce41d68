use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::error::{ErrorResponse, HttpError};
use super::stream::LeasedStream;
use crate::downloader::{QualitySelector, VideoMetadata};
use crate::error::ServiceError;
use crate::service::{ArtifactReference, DownloadService};

pub type AppState = Arc<DownloadService>;

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
}

/// Video details as the web UI reads them
#[derive(Debug, Serialize)]
pub struct InfoPayload {
    pub id: String,
    pub title: String,
    pub duration: u64,
    pub thumbnail: String,
    pub uploader: String,
    pub view_count: u64,
}

impl From<VideoMetadata> for InfoPayload {
    fn from(meta: VideoMetadata) -> Self {
        Self {
            id: meta.id,
            title: meta.title,
            duration: meta.duration_seconds,
            thumbnail: meta.thumbnail,
            uploader: meta.uploader,
            view_count: meta.view_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub success: bool,
    pub info: InfoPayload,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub artifact: ArtifactReference,
    pub download_url: String,
}

/// Bodies are parsed regardless of Content-Type, like the web UI expects
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, HttpError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejecting request body");
        HttpError(ServiceError::InvalidInput(
            "Invalid or malformed request data".to_string(),
        ))
    })
}

#[tracing::instrument(skip_all)]
pub async fn video_info(
    State(service): State<AppState>,
    body: Bytes,
) -> Result<Json<InfoResponse>, HttpError> {
    let request: InfoRequest = parse_body(&body)?;
    let meta = service.request_info(&request.url).await?;

    Ok(Json(InfoResponse {
        success: true,
        info: meta.into(),
    }))
}

#[tracing::instrument(skip_all)]
pub async fn download_video(
    State(service): State<AppState>,
    body: Bytes,
) -> Result<Json<DownloadResponse>, HttpError> {
    let request: DownloadRequest = parse_body(&body)?;
    let quality = QualitySelector::parse(request.format.as_deref().unwrap_or("best"))
        .map_err(ServiceError::from)?;

    let artifact = service.request_download(&request.url, quality).await?;
    let download_url = format!("/api/file/{}", artifact.id);

    Ok(Json(DownloadResponse {
        success: true,
        artifact,
        download_url,
    }))
}

#[tracing::instrument(skip_all)]
pub async fn download_file(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let lease = service.retrieve_artifact(&id)?;
    let file = lease.open().await?;

    let content_type = content_type_for(lease.extension());
    let size = lease.size();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", lease.file_name()))
        .map_err(|_| ServiceError::Internal("unrepresentable file name".to_string()))?;

    tracing::info!(artifact_id = %lease.id(), size, "Streaming artifact");
    let body = Body::from_stream(LeasedStream::new(file, lease));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub async fn health(State(service): State<AppState>) -> impl IntoResponse {
    let (info, downloads) = service.in_flight();
    Json(json!({
        "status": "ok",
        "artifacts": service.store().stats(),
        "in_flight": { "info": info, "downloads": downloads },
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            success: false,
            error: "Resource not found".to_string(),
            code: "NOT_FOUND",
        }),
    )
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "opus" | "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}
