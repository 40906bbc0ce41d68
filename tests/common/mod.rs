#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use youtube_download_service::artifacts::{
    AbandonPolicy, ArtifactStore, CapacityLimits, Clock, ManualClock, RetentionPolicy, StoreConfig,
};
use youtube_download_service::downloader::{
    DownloadError, DownloadedMedia, ExtractionClient, QualitySelector, VideoMetadata,
};
use youtube_download_service::service::{DownloadService, ExtractionLimits};

pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const PAYLOAD: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake media payload";

#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(DownloadError),
    /// Write a partial file, then never finish
    Hang,
}

/// Scripted extraction client with call counters
pub struct FakeClient {
    pub metadata_calls: AtomicUsize,
    pub media_calls: AtomicUsize,
    pub delay: Duration,
    behavior: Mutex<Behavior>,
}

impl FakeClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            metadata_calls: AtomicUsize::new(0),
            media_calls: AtomicUsize::new(0),
            delay,
            behavior: Mutex::new(Behavior::Succeed),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn media_calls(&self) -> usize {
        self.media_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn behavior(&self) -> Behavior {
        self.behavior.lock().unwrap().clone()
    }
}

pub fn metadata() -> VideoMetadata {
    VideoMetadata {
        id: "dQw4w9WgXcQ".to_string(),
        title: "Never Gonna Give You Up".to_string(),
        uploader: "Rick Astley".to_string(),
        duration_seconds: 213,
        view_count: 1_000_000,
        thumbnail: "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string(),
    }
}

#[async_trait]
impl ExtractionClient for FakeClient {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_metadata(&self, _url: &str) -> Result<VideoMetadata, DownloadError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.behavior() {
            Behavior::Succeed => Ok(metadata()),
            Behavior::Fail(e) => Err(e),
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn fetch_media(
        &self,
        _url: &str,
        _quality: &QualitySelector,
        staging_dir: &Path,
    ) -> Result<DownloadedMedia, DownloadError> {
        self.media_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior() {
            Behavior::Succeed => {
                tokio::time::sleep(self.delay).await;
                let path = staging_dir.join("media.mp4");
                tokio::fs::write(&path, PAYLOAD)
                    .await
                    .map_err(|e| DownloadError::ExecutionError(e.to_string()))?;
                Ok(DownloadedMedia {
                    path,
                    metadata: metadata(),
                })
            }
            Behavior::Fail(e) => {
                tokio::time::sleep(self.delay).await;
                Err(e)
            }
            Behavior::Hang => {
                let _ = tokio::fs::write(staging_dir.join("media.mp4.part"), b"partial").await;
                std::future::pending().await
            }
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub clock: ManualClock,
    pub store: ArtifactStore,
    pub client: Arc<FakeClient>,
    pub service: Arc<DownloadService>,
}

pub struct HarnessOptions {
    pub delay: Duration,
    pub timeout: Duration,
    pub metadata_timeout: Duration,
    pub capacity: CapacityLimits,
    pub policy: AbandonPolicy,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(5),
            capacity: CapacityLimits::default(),
            policy: AbandonPolicy::RunToCompletion,
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HarnessOptions::default())
    }

    pub fn with(options: HarnessOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::default();
        let mut config = StoreConfig::new(dir.path());
        config.retention = RetentionPolicy {
            max_age: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        };
        config.capacity = options.capacity;

        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = ArtifactStore::open(config, shared).unwrap();
        let client = Arc::new(FakeClient::new(options.delay));
        let service = Arc::new(DownloadService::new(
            client.clone(),
            store.clone(),
            ExtractionLimits {
                metadata: options.metadata_timeout,
                download: options.timeout,
            },
            options.policy,
        ));

        Self {
            dir,
            clock,
            store,
            client,
            service,
        }
    }

    /// Entries left in the staging area
    pub fn staging_entries(&self) -> usize {
        std::fs::read_dir(self.store.root().join(".staging"))
            .map(|d| d.count())
            .unwrap_or(0)
    }
}
