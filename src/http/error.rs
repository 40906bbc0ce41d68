use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ServiceError;

/// Failure body shared by every route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

/// Axum-facing wrapper so handlers can `?` a `ServiceError`
#[derive(Debug)]
pub struct HttpError(pub ServiceError);

impl From<ServiceError> for HttpError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::ExtractionFailure(_) => StatusCode::BAD_GATEWAY,
            ServiceError::StorageFull(_) => StatusCode::INSUFFICIENT_STORAGE,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client
    fn client_message(&self) -> String {
        match &self.0 {
            ServiceError::InvalidInput(msg)
            | ServiceError::ExtractionFailure(msg)
            | ServiceError::StorageFull(msg) => msg.clone(),
            ServiceError::NotFound => "File not found".to_string(),
            // I/O details stay in the logs
            ServiceError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self.0, code = self.0.code(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: self.client_message(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}
