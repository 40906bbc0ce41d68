// Common data models for the extraction adapter

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Descriptive metadata for one remote video.
///
/// Fetched per request and never cached; defaults mirror what the web UI
/// shows when the tool leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Platform-side id (e.g. the 11 character YouTube id)
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_seconds: u64,
    pub view_count: u64,
    /// Thumbnail URI, empty when unknown
    pub thumbnail: String,
}

impl VideoMetadata {
    pub const UNTITLED: &'static str = "Untitled";
    pub const UNKNOWN_UPLOADER: &'static str = "Unknown";

    /// Build from one yt-dlp info JSON object
    pub fn from_json(json: &serde_json::Value) -> Self {
        let duration_seconds = json["duration"]
            .as_f64()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64)
            .unwrap_or(0);

        Self {
            id: json["id"].as_str().unwrap_or("").to_string(),
            title: json["title"]
                .as_str()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(Self::UNTITLED)
                .to_string(),
            uploader: json["uploader"]
                .as_str()
                .unwrap_or(Self::UNKNOWN_UPLOADER)
                .to_string(),
            duration_seconds,
            view_count: json["view_count"].as_u64().unwrap_or(0),
            thumbnail: json["thumbnail"].as_str().unwrap_or("").to_string(),
        }
    }

    pub fn untitled() -> Self {
        Self::from_json(&serde_json::Value::Null)
    }
}

/// A finished download sitting in its staging directory
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub metadata: VideoMetadata,
}
