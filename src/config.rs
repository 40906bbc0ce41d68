//! Process configuration, read once from the environment at startup.
//!
//! Every option has an explicit default; `validate` rejects combinations
//! that would make retention or extraction meaningless.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::artifacts::{AbandonPolicy, CapacityLimits, RetentionPolicy, StoreConfig};
use crate::downloader::YtDlpConfig;
use crate::service::ExtractionLimits;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}: cannot parse '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub download_dir: PathBuf,
    pub retention: RetentionPolicy,
    pub capacity: CapacityLimits,
    pub extraction_timeout: Duration,
    pub metadata_timeout: Duration,
    pub orphan_grace: Duration,
    pub abandon_policy: AbandonPolicy,
    pub ytdlp_path: Option<String>,
    pub ytdlp_proxy: Option<String>,
    pub ytdlp_cookies: Option<PathBuf>,
    pub max_filesize_mb: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5038)),
            download_dir: PathBuf::from("./downloads"),
            retention: RetentionPolicy::default(),
            capacity: CapacityLimits {
                max_total_bytes: Some(10 * GIB),
                max_files: Some(200),
            },
            extraction_timeout: Duration::from_secs(600),
            metadata_timeout: Duration::from_secs(60),
            orphan_grace: Duration::from_secs(60),
            abandon_policy: AbandonPolicy::default(),
            ytdlp_path: None,
            ytdlp_proxy: None,
            ytdlp_cookies: None,
            max_filesize_mb: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("BIND_ADDR") {
            config.bind_addr = parse("BIND_ADDR", &v)?;
        }
        if let Some(v) = get("DOWNLOAD_DIR") {
            config.download_dir = expand_home(&v);
        }
        if let Some(v) = get("FILE_MAX_AGE_SECS") {
            config.retention.max_age = secs("FILE_MAX_AGE_SECS", &v)?;
        }
        if let Some(v) = get("CLEANUP_INTERVAL_SECS") {
            config.retention.sweep_interval = secs("CLEANUP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("STORAGE_MAX_BYTES") {
            let bytes: u64 = parse("STORAGE_MAX_BYTES", &v)?;
            config.capacity.max_total_bytes = (bytes > 0).then_some(bytes);
        }
        if let Some(v) = get("STORAGE_MAX_FILES") {
            let files: usize = parse("STORAGE_MAX_FILES", &v)?;
            config.capacity.max_files = (files > 0).then_some(files);
        }
        if let Some(v) = get("EXTRACTION_TIMEOUT_SECS") {
            config.extraction_timeout = secs("EXTRACTION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("METADATA_TIMEOUT_SECS") {
            config.metadata_timeout = secs("METADATA_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("ORPHAN_GRACE_SECS") {
            config.orphan_grace = secs("ORPHAN_GRACE_SECS", &v)?;
        }
        if let Some(v) = get("ABANDON_POLICY") {
            config.abandon_policy = v.parse().map_err(|reason| ConfigError::Invalid {
                name: "ABANDON_POLICY",
                value: v.clone(),
                reason,
            })?;
        }
        if let Some(v) = get("MAX_FILESIZE_MB") {
            config.max_filesize_mb = parse("MAX_FILESIZE_MB", &v)?;
        }
        config.ytdlp_path = get("YTDLP_PATH");
        config.ytdlp_proxy = get("YTDLP_PROXY");
        config.ytdlp_cookies = get("YTDLP_COOKIES").map(|v| expand_home(&v));

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention.max_age.is_zero() {
            return Err(ConfigError::Inconsistent(
                "FILE_MAX_AGE_SECS must be greater than zero".to_string(),
            ));
        }
        if self.retention.sweep_interval.is_zero() {
            return Err(ConfigError::Inconsistent(
                "CLEANUP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.extraction_timeout.is_zero() || self.metadata_timeout.is_zero() {
            return Err(ConfigError::Inconsistent(
                "extraction timeouts must be greater than zero".to_string(),
            ));
        }
        if self.metadata_timeout > self.extraction_timeout {
            return Err(ConfigError::Inconsistent(
                "METADATA_TIMEOUT_SECS cannot exceed EXTRACTION_TIMEOUT_SECS".to_string(),
            ));
        }
        if self.max_filesize_mb == 0 {
            return Err(ConfigError::Inconsistent(
                "MAX_FILESIZE_MB must be greater than zero".to_string(),
            ));
        }
        if let Some(max) = self.capacity.max_total_bytes {
            if max < self.max_filesize_mb.saturating_mul(1024 * 1024) {
                return Err(ConfigError::Inconsistent(
                    "STORAGE_MAX_BYTES is smaller than a single maximum-size download".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            root: self.download_dir.clone(),
            retention: self.retention,
            capacity: self.capacity,
            orphan_grace: self.orphan_grace,
        }
    }

    pub fn extraction_limits(&self) -> ExtractionLimits {
        ExtractionLimits {
            metadata: self.metadata_timeout,
            download: self.extraction_timeout,
        }
    }

    pub fn ytdlp_config(&self) -> YtDlpConfig {
        let defaults = YtDlpConfig::default();
        YtDlpConfig {
            binary: self
                .ytdlp_path
                .clone()
                .unwrap_or_else(|| defaults.binary.clone()),
            proxy: self.ytdlp_proxy.clone(),
            // Falls back to a cookies.txt in the working directory, used only if present
            cookies_path: self
                .ytdlp_cookies
                .clone()
                .or_else(|| Some(PathBuf::from("cookies.txt"))),
            metadata_timeout_secs: self.metadata_timeout.as_secs(),
            download_timeout_secs: self.extraction_timeout.as_secs(),
            max_filesize_mb: self.max_filesize_mb,
            ..defaults
        }
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(name, value).map(Duration::from_secs)
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}
