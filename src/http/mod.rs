// HTTP surface: JSON API plus streamed file delivery

pub mod error;
pub mod handlers;
pub mod stream;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::DownloadService;

/// JSON bodies only carry a URL and a format
const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn router(service: Arc<DownloadService>) -> Router {
    Router::new()
        .route("/api/info", post(handlers::video_info))
        .route("/api/download", post(handlers::download_video))
        .route("/api/file/{id}", get(handlers::download_file))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}
