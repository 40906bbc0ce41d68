// Error types for the extraction tool adapter

use thiserror::Error;

use super::diagnostics::diagnose_error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// The tool did not finish within the configured bound
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Network timeout while talking to the source platform
    #[error("Network timeout: the source is not responding")]
    NetworkTimeout,

    /// The platform rejected the request (429, bot detection, etc.)
    #[error("Request blocked by the source platform")]
    Blocked,

    /// yt-dlp not found on this host
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The tool does not know how to handle this URL
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// Quality selector that cannot be passed to the tool
    #[error("Invalid format selector: {0}")]
    InvalidFormat(String),

    /// Media exceeds the configured --max-filesize
    #[error("File is larger than the {0} MB limit")]
    FileTooLarge(u64),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The tool exited cleanly but left no media file behind
    #[error("Download produced no output file")]
    MissingOutput,

    /// Command could not be spawned or awaited
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Non-zero exit with the tool's stderr
    #[error("Tool failure: {0}")]
    ToolFailure(String),
}

impl DownloadError {
    /// Message that is safe to show to the person who submitted the URL.
    ///
    /// Raw stderr and local paths stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(secs) => format!("The extraction timed out after {}s", secs),
            Self::NetworkTimeout => "The video source is not responding, try again later".to_string(),
            Self::Blocked => "The video source is temporarily blocking requests, try again later".to_string(),
            Self::ToolNotFound(_) => "The download tool is not available on this server".to_string(),
            Self::UnsupportedUrl(_) => "This URL is not supported".to_string(),
            Self::InvalidFormat(spec) => format!("Unsupported format selector: {}", spec),
            Self::FileTooLarge(mb) => format!("The video is larger than the {} MB limit", mb),
            Self::ParseError(_) => "The download tool returned unreadable output".to_string(),
            Self::MissingOutput => "The download finished without producing a file".to_string(),
            Self::ExecutionError(_) => "The download tool could not be run".to_string(),
            Self::ToolFailure(stderr) => diagnose_error(stderr).user_message().to_string(),
        }
    }
}

// Classify raw tool stderr
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429") || lower.contains("too many requests") {
            return Self::Blocked;
        }

        if lower.contains("unsupported url") {
            return Self::UnsupportedUrl(s);
        }

        if lower.contains("command not found") || lower.contains("no such file or directory") {
            return Self::ToolNotFound(s);
        }

        Self::ToolFailure(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_classification() {
        assert_eq!(
            DownloadError::from("ERROR: Read timed out.".to_string()),
            DownloadError::NetworkTimeout
        );
        assert_eq!(
            DownloadError::from("HTTP Error 429: Too Many Requests".to_string()),
            DownloadError::Blocked
        );
        assert!(matches!(
            DownloadError::from("ERROR: Unsupported URL: https://example.com".to_string()),
            DownloadError::UnsupportedUrl(_)
        ));
        assert!(matches!(
            DownloadError::from("ERROR: Private video".to_string()),
            DownloadError::ToolFailure(_)
        ));
    }

    #[test]
    fn test_user_message_hides_stderr() {
        let err = DownloadError::ToolFailure(
            "ERROR: [youtube] abc: Video unavailable. /home/app/downloads/x".to_string(),
        );
        let message = err.user_message();
        assert!(!message.contains("/home/app"));
        assert!(message.to_lowercase().contains("unavailable"));
    }
}
