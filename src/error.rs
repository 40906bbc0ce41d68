//! Boundary error taxonomy.
//!
//! Everything the extraction tool or the filesystem can throw is converted
//! into one of these kinds before it reaches a caller. The type is `Clone`
//! because every follower of a deduplicated operation receives the leader's
//! error.

use thiserror::Error;

use crate::downloader::DownloadError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed or unsupported URL / format, rejected before any work starts
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tool-reported error, network error, or timeout
    #[error("{0}")]
    ExtractionFailure(String),

    /// Capacity ceiling still exceeded after an eviction attempt
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// Unknown, expired, or deleted artifact id
    #[error("File not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ExtractionFailure(_) => "EXTRACTION_FAILED",
            Self::StorageFull(_) => "STORAGE_FULL",
            Self::NotFound => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        Self::Internal(format!("{}: {}", context, err))
    }
}

impl From<DownloadError> for ServiceError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::InvalidFormat(_) => Self::InvalidInput(err.user_message()),
            other => Self::ExtractionFailure(other.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_errors_become_extraction_failures() {
        let err = ServiceError::from(DownloadError::Timeout(30));
        assert_eq!(
            err,
            ServiceError::ExtractionFailure("The extraction timed out after 30s".to_string())
        );

        let err = ServiceError::from(DownloadError::ExecutionError(
            "Failed to start /usr/bin/yt-dlp: permission denied".to_string(),
        ));
        assert!(!err.to_string().contains("/usr/bin"));
    }

    #[test]
    fn test_bad_format_is_invalid_input() {
        let err = ServiceError::from(DownloadError::InvalidFormat("x;y".to_string()));
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
