// Downloader module - adapter around the external extraction tool

pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod traits;
pub mod utils;
pub mod ytdlp;

pub use diagnostics::{diagnose_error, FailureReason};
pub use errors::DownloadError;
pub use format_selector::QualitySelector;
pub use models::{DownloadedMedia, VideoMetadata};
pub use traits::ExtractionClient;
pub use ytdlp::{YtDlpClient, YtDlpConfig};
