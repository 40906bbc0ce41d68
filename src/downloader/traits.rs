// Extraction client trait definition

use async_trait::async_trait;
use std::path::Path;

use super::errors::DownloadError;
use super::format_selector::QualitySelector;
use super::models::{DownloadedMedia, VideoMetadata};

/// Adapter around an external metadata/download tool.
///
/// Both calls are slow and may fail for reasons outside this service's
/// control. Callers bound them with a timeout and run them off the request
/// path.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Name of the client (for logging)
    fn name(&self) -> &'static str;

    /// Fetch descriptive metadata without downloading
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, DownloadError>;

    /// Download the media into `staging_dir` and return the finished file
    async fn fetch_media(
        &self,
        url: &str,
        quality: &QualitySelector,
        staging_dir: &Path,
    ) -> Result<DownloadedMedia, DownloadError>;
}
