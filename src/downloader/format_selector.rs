// QualitySelector - maps the quality a client asks for to a yt-dlp format spec
//
// Accepted values:
// - "best" (default)
// - "<height>p", e.g. "1080p", "720p"
// - "audio"
// - a raw yt-dlp format expression restricted to a safe character set

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DownloadError;

const MAX_CUSTOM_SPEC_LEN: usize = 128;
const MIN_HEIGHT: u32 = 144;
const MAX_HEIGHT: u32 = 4320;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QualitySelector {
    #[default]
    Best,
    /// Best video no taller than this, merged with best audio
    MaxHeight(u32),
    AudioOnly,
    /// Format expression passed through to `-f`
    Custom(String),
}

impl QualitySelector {
    pub fn parse(raw: &str) -> Result<Self, DownloadError> {
        let value = raw.trim();

        match value.to_ascii_lowercase().as_str() {
            "" | "best" => return Ok(Self::Best),
            "audio" | "bestaudio" => return Ok(Self::AudioOnly),
            _ => {}
        }

        if let Some(height) = value
            .strip_suffix(['p', 'P'])
            .and_then(|h| h.parse::<u32>().ok())
        {
            if (MIN_HEIGHT..=MAX_HEIGHT).contains(&height) {
                return Ok(Self::MaxHeight(height));
            }
            return Err(DownloadError::InvalidFormat(value.to_string()));
        }

        let allowed = |c: char| c.is_ascii_alphanumeric() || "+/[]<>=*._:-".contains(c);
        if value.len() > MAX_CUSTOM_SPEC_LEN || !value.chars().all(allowed) || value.starts_with('-')
        {
            return Err(DownloadError::InvalidFormat(value.to_string()));
        }

        Ok(Self::Custom(value.to_string()))
    }

    /// Format spec for yt-dlp `-f`
    pub fn format_spec(&self) -> String {
        match self {
            Self::Best => "bv*+ba/best".to_string(),
            Self::MaxHeight(h) => format!("bv*[height<={h}]+ba/b[height<={h}]/bv*+ba/best"),
            Self::AudioOnly => "ba/b".to_string(),
            Self::Custom(spec) => spec.clone(),
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }
}

impl fmt::Display for QualitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::MaxHeight(h) => write!(f, "{}p", h),
            Self::AudioOnly => write!(f, "audio"),
            Self::Custom(spec) => write!(f, "{}", spec),
        }
    }
}

impl FromStr for QualitySelector {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QualitySelector {
    type Error = DownloadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QualitySelector> for String {
    fn from(value: QualitySelector) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_qualities() {
        assert_eq!(QualitySelector::parse("best").unwrap(), QualitySelector::Best);
        assert_eq!(QualitySelector::parse("").unwrap(), QualitySelector::Best);
        assert_eq!(QualitySelector::parse("720p").unwrap(), QualitySelector::MaxHeight(720));
        assert_eq!(QualitySelector::parse("Audio").unwrap(), QualitySelector::AudioOnly);
    }

    #[test]
    fn test_height_spec() {
        let spec = QualitySelector::MaxHeight(1080).format_spec();
        assert!(spec.starts_with("bv*[height<=1080]+ba"));
        assert!(spec.ends_with("/best"));
    }

    #[test]
    fn test_custom_spec_passthrough() {
        let q = QualitySelector::parse("137+140").unwrap();
        assert_eq!(q.format_spec(), "137+140");
    }

    #[test]
    fn test_rejects_unsafe_specs() {
        assert!(QualitySelector::parse("best; rm -rf /").is_err());
        assert!(QualitySelector::parse("--exec=touch").is_err());
        assert!(QualitySelector::parse("99999p").is_err());
        assert!(QualitySelector::parse(&"a".repeat(200)).is_err());
    }
}
