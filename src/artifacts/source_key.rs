//! Canonical identity of a requested video.
//!
//! Two URLs that address the same video normalize to the same key, so the
//! key can be used both for request dedup and for logging.

use reqwest::Url;
use std::fmt;

use crate::error::ServiceError;

const MAX_URL_LEN: usize = 2048;

/// Query parameters that never change which resource a URL addresses
const TRACKING_PARAMS: &[&str] = &["si", "feature", "fbclid", "gclid", "igshid", "ref_src"];

lazy_static::lazy_static! {
    static ref VIDEO_ID_RE: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(String);

impl SourceKey {
    /// Validate and canonicalize a client-supplied URL
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("Please provide a video URL"));
        }
        if trimmed.len() > MAX_URL_LEN {
            return Err(invalid("URL is too long"));
        }

        let url = Url::parse(trimmed).map_err(|_| invalid("Malformed URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("Only http and https URLs are supported"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("URLs with embedded credentials are not accepted"));
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("URL has no host"))?
            .trim_end_matches('.')
            .to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

        if let Some(site) = youtube_site(&host) {
            return match youtube_video_id(site, &url) {
                Some(id) => Ok(Self(format!("https://www.youtube.com/watch?v={}", id))),
                None => Err(invalid("URL does not point to a single video")),
            };
        }

        Self::generic(url, &host)
    }

    fn generic(mut url: Url, host: &str) -> Result<Self, ServiceError> {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.starts_with("utm_") && !TRACKING_PARAMS.iter().any(|p| k == p))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();

        let path = url.path().trim_end_matches('/').to_string();

        url.set_fragment(None);
        url.set_host(Some(host)).map_err(|_| invalid("Malformed host"))?;
        url.set_path(&path);
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs.iter());
        }

        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn invalid(message: &str) -> ServiceError {
    ServiceError::InvalidInput(message.to_string())
}

#[derive(Clone, Copy)]
enum YoutubeSite {
    Main,
    Short,
}

fn youtube_site(host: &str) -> Option<YoutubeSite> {
    match host {
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            Some(YoutubeSite::Main)
        }
        "youtu.be" => Some(YoutubeSite::Short),
        _ => None,
    }
}

fn youtube_video_id(site: YoutubeSite, url: &Url) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate = match (site, segments.as_slice()) {
        (YoutubeSite::Short, [id, ..]) => Some(id.to_string()),
        (YoutubeSite::Main, ["watch"]) => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned()),
        (YoutubeSite::Main, [kind, id, ..])
            if matches!(*kind, "shorts" | "embed" | "live" | "v") =>
        {
            Some(id.to_string())
        }
        _ => None,
    }?;

    VIDEO_ID_RE.is_match(&candidate).then_some(candidate)
}
