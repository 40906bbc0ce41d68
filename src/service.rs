//! Boundary operations: metadata lookup, download, artifact retrieval.
//!
//! URLs are validated here, before any gate entry exists; extraction work is
//! deduplicated per canonical source and its outcome shared with every
//! concurrent caller.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::artifacts::{
    AbandonPolicy, ArtifactId, ArtifactLease, ArtifactStore, GateKey, OperationKind, RequestGate,
    SourceKey,
};
use crate::downloader::{DownloadError, ExtractionClient, QualitySelector, VideoMetadata};
use crate::error::ServiceError;

/// What a client needs to fetch a finished download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReference {
    pub id: ArtifactId,
    pub title: String,
    #[serde(rename = "filename")]
    pub file_name: String,
}

/// Upper bounds on a single `ExtractionClient` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub metadata: Duration,
    pub download: Duration,
}

pub struct DownloadService {
    client: Arc<dyn ExtractionClient>,
    store: ArtifactStore,
    limits: ExtractionLimits,
    info_gate: RequestGate<VideoMetadata>,
    download_gate: RequestGate<ArtifactReference>,
}

impl DownloadService {
    pub fn new(
        client: Arc<dyn ExtractionClient>,
        store: ArtifactStore,
        limits: ExtractionLimits,
        policy: AbandonPolicy,
    ) -> Self {
        Self {
            client,
            store,
            limits,
            info_gate: RequestGate::new(policy),
            download_gate: RequestGate::new(policy),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Operations currently running (metadata, downloads)
    pub fn in_flight(&self) -> (usize, usize) {
        (self.info_gate.in_flight(), self.download_gate.in_flight())
    }

    pub async fn request_info(&self, url: &str) -> Result<VideoMetadata, ServiceError> {
        let source = SourceKey::parse(url)?;
        let client = Arc::clone(&self.client);
        let key = GateKey::new(source.clone(), OperationKind::Info);
        let limit = self.limits.metadata;

        let result = self
            .info_gate
            .run(key, move || async move {
                bounded(limit, &source, client.fetch_metadata(source.as_str())).await
            })
            .await;

        if let Err(e) = &result {
            tracing::warn!(url = %url, error = %e, "Metadata request failed");
        }
        result
    }

    pub async fn request_download(
        &self,
        url: &str,
        quality: QualitySelector,
    ) -> Result<ArtifactReference, ServiceError> {
        let source = SourceKey::parse(url)?;
        let client = Arc::clone(&self.client);
        let store = self.store.clone();
        let key = GateKey::new(source.clone(), OperationKind::Download(quality.clone()));
        let limit = self.limits.download;

        let result = self
            .download_gate
            .run(key, move || async move {
                let pending = store.reserve(&source)?;
                tracing::info!(
                    artifact_id = %pending.id(),
                    source = %source,
                    quality = %quality,
                    tool = client.name(),
                    "Starting download"
                );

                // Only the extraction is bounded; once the file is in hand,
                // registering it always runs to the end
                let media = bounded(
                    limit,
                    &source,
                    client.fetch_media(source.as_str(), &quality, pending.staging_dir()),
                )
                .await?;

                let title = media.metadata.title.clone();
                let record = tokio::task::spawn_blocking(move || {
                    store.register(pending, &media.path, &title)
                })
                .await
                .map_err(|e| ServiceError::Internal(format!("register task failed: {}", e)))??;

                Ok::<_, ServiceError>(ArtifactReference {
                    id: record.id,
                    file_name: record.download_name(),
                    title: record.title,
                })
            })
            .await;

        if let Err(e) = &result {
            tracing::warn!(url = %url, error = %e, code = e.code(), "Download request failed");
        }
        result
    }

    /// Pin a ready artifact for streaming; the lease must live as long as
    /// the response body.
    pub fn retrieve_artifact(&self, id: &str) -> Result<ArtifactLease, ServiceError> {
        self.store.resolve(id)
    }
}

async fn bounded<T, Fut>(limit: Duration, source: &SourceKey, call: Fut) -> Result<T, ServiceError>
where
    Fut: Future<Output = Result<T, DownloadError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => {
            tracing::warn!(source = %source, timeout_secs = limit.as_secs(), "Extraction timed out");
            Err(ServiceError::ExtractionFailure(format!(
                "The extraction timed out after {}s",
                limit.as_secs()
            )))
        }
    }
}
