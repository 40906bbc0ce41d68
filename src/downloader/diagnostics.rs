// Failure diagnostics - maps yt-dlp stderr to a reason a user can act on
//
// Matching is ordered from most to least specific; the first hit wins.

/// Why the source platform refused to hand over a video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// DRM-protected or paid content, never downloadable
    DrmProtected,

    /// Requires a channel membership
    MembersOnly,

    /// Requires a signed-in adult account
    AgeRestricted,

    /// Private video
    PrivateVideo,

    /// Deleted, removed for copyright, or otherwise gone
    VideoUnavailable,

    /// Not available from this server's region
    GeoBlocked,

    /// 429 or similar
    RateLimited,

    /// Captcha / "confirm you're not a bot"
    BotDetection,

    /// HTTP 403 without a more specific hint
    Forbidden,

    /// Connection-level failures
    NetworkTimeout,

    /// The extractor has no support for the URL
    UnsupportedUrl,

    Unknown,
}

impl FailureReason {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DrmProtected => "This video is DRM-protected or paid content and cannot be downloaded",
            Self::MembersOnly => "This video is only available to channel members",
            Self::AgeRestricted => "This video is age-restricted and cannot be fetched anonymously",
            Self::PrivateVideo => "This video is private",
            Self::VideoUnavailable => "This video is unavailable or has been removed",
            Self::GeoBlocked => "This video is not available in the server's region",
            Self::RateLimited => "The video source is rate-limiting requests, try again in a few minutes",
            Self::BotDetection => "The video source flagged the request as automated, try again later",
            Self::Forbidden => "The video source denied access (HTTP 403)",
            Self::NetworkTimeout => "The video source is not responding, try again later",
            Self::UnsupportedUrl => "This URL is not supported",
            Self::Unknown => "Could not fetch the video",
        }
    }
}

/// Analyze an error message and return the most specific reason
pub fn diagnose_error(error: &str) -> FailureReason {
    let lower = error.to_lowercase();

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("requires purchase")
        || lower.contains("rental")
        || lower.contains("youtube premium")
    {
        return FailureReason::DrmProtected;
    }

    if lower.contains("members only")
        || lower.contains("members-only")
        || lower.contains("join this channel")
        || lower.contains("available to members")
    {
        return FailureReason::MembersOnly;
    }

    if lower.contains("age-restricted") || lower.contains("confirm your age") {
        return FailureReason::AgeRestricted;
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return FailureReason::PrivateVideo;
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
    {
        return FailureReason::VideoUnavailable;
    }

    if lower.contains("not available in your country") || lower.contains("geo restrict") {
        return FailureReason::GeoBlocked;
    }

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit") {
        return FailureReason::RateLimited;
    }

    if lower.contains("not a bot") || lower.contains("captcha") || lower.contains("unusual traffic") {
        return FailureReason::BotDetection;
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return FailureReason::Forbidden;
    }

    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
    {
        return FailureReason::NetworkTimeout;
    }

    if lower.contains("unsupported url") {
        return FailureReason::UnsupportedUrl;
    }

    FailureReason::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_403_detection() {
        assert_eq!(diagnose_error("ERROR: HTTP Error 403: Forbidden"), FailureReason::Forbidden);
    }

    #[test]
    fn test_age_restricted_detection() {
        assert_eq!(
            diagnose_error("Sign in to confirm your age. This video may be inappropriate"),
            FailureReason::AgeRestricted
        );
    }

    #[test]
    fn test_bot_detection() {
        assert_eq!(
            diagnose_error("Sign in to confirm you're not a bot"),
            FailureReason::BotDetection
        );
    }

    #[test]
    fn test_unavailable() {
        let reason = diagnose_error("ERROR: [youtube] xyz: Video unavailable");
        assert_eq!(reason, FailureReason::VideoUnavailable);
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(diagnose_error(""), FailureReason::Unknown);
        assert_eq!(diagnose_error("something odd"), FailureReason::Unknown);
    }
}
