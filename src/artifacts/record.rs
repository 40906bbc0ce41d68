use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

use super::source_key::SourceKey;

const MAX_FILE_STEM_LEN: usize = 120;

/// Public token for a produced file. Always generated here, never taken
/// from a client; the simple (32 hex) uuid form doubles as the file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Accepts only the exact 32 lowercase-hex form, so separators, dots and
    /// encoded characters are refused before the registry is consulted.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != 32 || !raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return None;
        }
        Uuid::try_parse(raw).ok().map(Self)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl Serialize for ArtifactId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactState {
    /// Download in flight; file not trustworthy yet
    Pending,
    /// Complete and retrievable
    Ready,
    /// Past the retention window, waiting for physical deletion
    Expired,
    /// Terminal; the record leaves the registry in this state
    Deleted,
}

#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub id: ArtifactId,
    /// Absolute location; never sent to clients
    pub path: PathBuf,
    pub size: u64,
    /// Completion time (reservation time while pending)
    pub created_at: OffsetDateTime,
    pub state: ArtifactState,
    /// Readers currently streaming the file
    pub ref_count: usize,
    pub title: String,
    pub extension: String,
    /// None for files adopted at startup
    pub source: Option<SourceKey>,
}

impl ArtifactRecord {
    /// Name offered to the browser for the attachment
    pub fn download_name(&self) -> String {
        download_name(&self.title, &self.id, &self.extension)
    }
}

/// `<sanitized title>.<ext>`, falling back to the id when nothing printable
/// survives sanitizing
pub fn download_name(title: &str, id: &ArtifactId, extension: &str) -> String {
    let mut stem: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem = stem.trim_matches(|c: char| c == '_' || c.is_whitespace()).to_string();
    stem.truncate(MAX_FILE_STEM_LEN);

    if stem.is_empty() {
        stem = id.to_string();
    }
    format!("{}.{}", stem, extension)
}

/// Lowercase alphanumeric extension of at most 8 chars, or "bin"
pub fn sanitize_extension(raw: Option<&str>) -> String {
    raw.map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}
