// yt-dlp extraction client
//
// Metadata: `--dump-json` (simulate only).
// Download: `-j --no-simulate` so the info JSON is printed while the media is
// written into the staging directory; the finished file is found by scanning
// that directory afterwards since merges and remuxes change the extension.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::errors::DownloadError;
use super::format_selector::QualitySelector;
use super::models::{DownloadedMedia, VideoMetadata};
use super::traits::ExtractionClient;
use super::utils::{find_binary, run_output_with_timeout};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";
const REFERER: &str = "https://www.youtube.com/";

/// Suffixes yt-dlp uses for in-progress or side files
const INCOMPLETE_SUFFIXES: &[&str] = &["part", "ytdl", "temp", "tmp", "json"];

/// Settings for the yt-dlp process
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Binary path; auto-detected when not configured
    pub binary: String,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Netscape cookies.txt, only passed when the file exists
    pub cookies_path: Option<PathBuf>,
    /// Per-connection socket timeout
    pub socket_timeout_secs: u64,
    /// Bound on a metadata process
    pub metadata_timeout_secs: u64,
    /// Bound on a download process
    pub download_timeout_secs: u64,
    /// `--max-filesize`, in megabytes
    pub max_filesize_mb: u64,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: find_binary("yt-dlp"),
            proxy: None,
            cookies_path: None,
            socket_timeout_secs: 30,
            metadata_timeout_secs: 60,
            download_timeout_secs: 600,
            max_filesize_mb: 500,
        }
    }
}

pub struct YtDlpClient {
    config: YtDlpConfig,
}

impl YtDlpClient {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// `yt-dlp --version`, or None when the binary cannot be run
    pub async fn version(&self) -> Option<String> {
        let out = run_output_with_timeout(&self.config.binary, vec!["--version".to_string()], 10)
            .await
            .ok()?;
        if !out.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Arguments shared by metadata and download calls
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-update".to_string(),
            "--no-check-certificates".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            "3".to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
            "--referer".to_string(),
            REFERER.to_string(),
        ];

        if let Some(path) = self.config.cookies_path.as_ref().filter(|p| p.is_file()) {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["--dump-json".to_string(), "--skip-download".to_string()];
        args.extend(self.common_args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn download_args(&self, url: &str, quality: &QualitySelector, staging_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            quality.format_spec(),
            "--dump-json".to_string(),
            "--no-simulate".to_string(),
            "--no-progress".to_string(),
            "--max-filesize".to_string(),
            format!("{}M", self.config.max_filesize_mb),
            "-P".to_string(),
            staging_dir.to_string_lossy().to_string(),
            // Title stays in the registry; the file name on disk is fixed
            "-o".to_string(),
            "media.%(ext)s".to_string(),
        ];

        if !quality.is_audio_only() {
            args.push("--merge-output-format".to_string());
            args.push("mp4".to_string());
        }

        args.extend(self.common_args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    async fn run(&self, args: Vec<String>, timeout_secs: u64) -> Result<std::process::Output, DownloadError> {
        tracing::debug!(
            binary = %self.config.binary,
            args = %args.join(" "),
            "Running yt-dlp"
        );

        let output = run_output_with_timeout(&self.config.binary, args, timeout_secs).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::warn!(status = ?output.status.code(), stderr = %stderr.trim(), "yt-dlp failed");
            return Err(DownloadError::from(stderr));
        }

        Ok(output)
    }

    /// Last JSON object on stdout (yt-dlp prints one line per entry)
    fn parse_info(stdout: &[u8]) -> Result<serde_json::Value, DownloadError> {
        let text = String::from_utf8_lossy(stdout);
        let line = text
            .lines()
            .rev()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| DownloadError::ParseError("No JSON object in output".to_string()))?;

        serde_json::from_str(line).map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Find the completed media file in the staging directory
    async fn locate_output(staging_dir: &Path) -> Result<Option<PathBuf>, DownloadError> {
        let mut entries = tokio::fs::read_dir(staging_dir)
            .await
            .map_err(|e| DownloadError::ExecutionError(format!("Cannot read staging dir: {}", e)))?;

        let mut best: Option<(u64, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DownloadError::ExecutionError(format!("Cannot read staging dir: {}", e)))?
        {
            let path = entry.path();
            let incomplete = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(true, |ext| INCOMPLETE_SUFFIXES.contains(&ext.to_ascii_lowercase().as_str()));
            if incomplete {
                continue;
            }

            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }

            if best.as_ref().map_or(true, |(size, _)| meta.len() > *size) {
                best = Some((meta.len(), path));
            }
        }

        Ok(best.map(|(_, path)| path))
    }
}

#[async_trait]
impl ExtractionClient for YtDlpClient {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, DownloadError> {
        let output = self
            .run(self.metadata_args(url), self.config.metadata_timeout_secs)
            .await?;
        let info = Self::parse_info(&output.stdout)?;
        Ok(VideoMetadata::from_json(&info))
    }

    async fn fetch_media(
        &self,
        url: &str,
        quality: &QualitySelector,
        staging_dir: &Path,
    ) -> Result<DownloadedMedia, DownloadError> {
        let output = self
            .run(
                self.download_args(url, quality, staging_dir),
                self.config.download_timeout_secs,
            )
            .await?;

        let metadata = match Self::parse_info(&output.stdout) {
            Ok(info) => VideoMetadata::from_json(&info),
            Err(e) => {
                tracing::warn!(error = %e, "Download finished without readable info JSON");
                VideoMetadata::untitled()
            }
        };

        match Self::locate_output(staging_dir).await? {
            Some(path) => Ok(DownloadedMedia { path, metadata }),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.contains("max-filesize") {
                    Err(DownloadError::FileTooLarge(self.config.max_filesize_mb))
                } else {
                    Err(DownloadError::MissingOutput)
                }
            }
        }
    }
}
