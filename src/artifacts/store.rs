//! On-disk artifact store and its in-memory registry.
//!
//! Finished files live directly under the root as `<id>.<ext>`; in-flight
//! downloads write into `<root>/.staging/<id>/`. Paths are only ever built
//! from generated ids and validated extensions.

use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

use super::clock::{age_exceeds, Clock};
use super::lock;
use super::record::{download_name, sanitize_extension, ArtifactId, ArtifactRecord, ArtifactState};
use super::source_key::SourceKey;
use super::sweeper::{self, RetentionPolicy};
use crate::error::ServiceError;

const STAGING_DIR: &str = ".staging";

/// Ceilings on what the root may hold; `None` means unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityLimits {
    pub max_total_bytes: Option<u64>,
    pub max_files: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub retention: RetentionPolicy,
    pub capacity: CapacityLimits,
    /// Files found at startup younger than this are adopted as ready
    pub orphan_grace: Duration,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retention: RetentionPolicy::default(),
            capacity: CapacityLimits::default(),
            orphan_grace: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Unknown id, or the file had already disappeared
    AlreadyGone,
    /// Readers hold leases (or the download is still pending); retry later
    InUse,
    /// I/O error; the record stays expired for the next sweep
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub pending: usize,
    pub ready: usize,
    pub expired: usize,
    pub file_count: usize,
    pub total_bytes: u64,
    pub active_readers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub adopted: usize,
    pub orphaned: usize,
    pub discarded: usize,
}

struct StoreInner {
    root: PathBuf,
    staging: PathBuf,
    retention: RetentionPolicy,
    capacity: CapacityLimits,
    orphan_grace: Duration,
    clock: Arc<dyn Clock>,
    registry: Mutex<HashMap<ArtifactId, ArtifactRecord>>,
}

/// Cheap cloneable handle; every clone sees the same registry
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
}

impl ArtifactStore {
    pub fn open(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        fs::create_dir_all(&config.root)
            .map_err(|e| ServiceError::io("Failed to create storage directory", e))?;
        let root = config
            .root
            .canonicalize()
            .map_err(|e| ServiceError::io("Failed to resolve storage directory", e))?;
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging)
            .map_err(|e| ServiceError::io("Failed to create staging directory", e))?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                staging,
                retention: config.retention,
                capacity: config.capacity,
                orphan_grace: config.orphan_grace,
                clock,
                registry: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.inner.retention
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    /// Rebuild the registry from the directory contents after a restart
    pub fn recover(&self) -> Result<RecoveryReport, ServiceError> {
        let inner = &self.inner;
        let mut report = RecoveryReport::default();

        if let Err(e) = fs::remove_dir_all(&inner.staging) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "Failed to clear staging directory");
            }
        }
        fs::create_dir_all(&inner.staging)
            .map_err(|e| ServiceError::io("Failed to create staging directory", e))?;

        let entries = fs::read_dir(&inner.root)
            .map_err(|e| ServiceError::io("Failed to read storage directory", e))?;
        let now = inner.clock.now();
        let mut registry = lock(&inner.registry);

        for entry in entries.flatten() {
            let path = entry.path();
            if path == inner.staging {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                tracing::debug!(path = %path.display(), "Leaving unexpected directory alone");
                continue;
            }

            let Some(id) = adoptable_id(&path) else {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove foreign file");
                }
                report.discarded += 1;
                continue;
            };

            let created_at = meta
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(now);
            let state = if age_exceeds(now, created_at, inner.orphan_grace) {
                report.orphaned += 1;
                ArtifactState::Expired
            } else {
                report.adopted += 1;
                ArtifactState::Ready
            };

            let extension = sanitize_extension(path.extension().and_then(|e| e.to_str()));
            registry.insert(
                id,
                ArtifactRecord {
                    id,
                    path,
                    size: meta.len(),
                    created_at,
                    state,
                    ref_count: 0,
                    title: String::new(),
                    extension,
                    source: None,
                },
            );
        }
        drop(registry);

        tracing::info!(
            adopted = report.adopted,
            orphaned = report.orphaned,
            discarded = report.discarded,
            root = %inner.root.display(),
            "Storage directory recovered"
        );
        Ok(report)
    }

    /// Create a pending record with its own staging directory
    pub fn reserve(&self, source: &SourceKey) -> Result<PendingArtifact, ServiceError> {
        let id = ArtifactId::generate();
        let staging_dir = self.inner.staging.join(id.to_string());
        fs::create_dir_all(&staging_dir)
            .map_err(|e| ServiceError::io("Failed to create staging directory", e))?;

        lock(&self.inner.registry).insert(
            id,
            ArtifactRecord {
                id,
                path: staging_dir.clone(),
                size: 0,
                created_at: self.inner.clock.now(),
                state: ArtifactState::Pending,
                ref_count: 0,
                title: String::new(),
                extension: String::new(),
                source: Some(source.clone()),
            },
        );

        Ok(PendingArtifact {
            store: self.clone(),
            id,
            staging_dir,
            committed: false,
        })
    }

    /// Move a finished download into the root and make it retrievable.
    ///
    /// On any failure neither a record nor a file is left behind.
    #[tracing::instrument(skip(self, pending, title), fields(artifact_id = %pending.id))]
    pub fn register(
        &self,
        mut pending: PendingArtifact,
        media: &Path,
        title: &str,
    ) -> Result<ArtifactRecord, ServiceError> {
        if !media.starts_with(&pending.staging_dir) {
            return Err(ServiceError::Internal(
                "downloaded file is outside its staging directory".to_string(),
            ));
        }
        let meta = fs::symlink_metadata(media)
            .map_err(|e| ServiceError::io("Downloaded file is missing", e))?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(ServiceError::ExtractionFailure(
                "The download produced no usable file".to_string(),
            ));
        }
        let size = meta.len();

        if !self.fits(size) {
            tracing::info!(size, "Storage ceiling reached, sweeping before admission");
            sweeper::sweep(self);
            if !self.fits(size) {
                return Err(self.storage_full(size));
            }
        }

        let extension = sanitize_extension(media.extension().and_then(|e| e.to_str()));
        let target = self.inner.root.join(format!("{}.{}", pending.id, extension));
        move_file(media, &target).map_err(|e| ServiceError::io("Failed to store download", e))?;

        let record = {
            let mut registry = lock(&self.inner.registry);
            if !fits_locked(&registry, self.inner.capacity, size) {
                drop(registry);
                discard_file(&target);
                return Err(self.storage_full(size));
            }
            let Some(record) = registry.get_mut(&pending.id) else {
                drop(registry);
                discard_file(&target);
                return Err(ServiceError::Internal("reservation vanished".to_string()));
            };
            record.path = target;
            record.size = size;
            record.created_at = self.inner.clock.now();
            record.state = ArtifactState::Ready;
            record.title = title.to_string();
            record.extension = extension;
            record.clone()
        };

        pending.committed = true;
        if let Err(e) = fs::remove_dir_all(&pending.staging_dir) {
            tracing::debug!(error = %e, "Staging directory cleanup failed");
        }

        tracing::info!(
            artifact_id = %record.id,
            source = record.source.as_ref().map_or("unknown", |s| s.as_str()),
            size,
            file = %record.download_name(),
            "Artifact ready"
        );
        Ok(record)
    }

    /// Look up a ready artifact by its public id and pin it for reading
    pub fn resolve(&self, raw_id: &str) -> Result<ArtifactLease, ServiceError> {
        let id = ArtifactId::parse(raw_id).ok_or(ServiceError::NotFound)?;

        let mut registry = lock(&self.inner.registry);
        let record = registry
            .get_mut(&id)
            .filter(|r| r.state == ArtifactState::Ready)
            .ok_or(ServiceError::NotFound)?;
        record.ref_count += 1;

        Ok(ArtifactLease {
            store: self.clone(),
            id,
            path: record.path.clone(),
            size: record.size,
            file_name: record.download_name(),
            extension: record.extension.clone(),
        })
    }

    /// Delete an artifact's file and record. Safe to call repeatedly.
    pub fn remove(&self, id: &ArtifactId) -> RemoveOutcome {
        let path = {
            let mut registry = lock(&self.inner.registry);
            let Some(record) = registry.get_mut(id) else {
                return RemoveOutcome::AlreadyGone;
            };
            if record.state == ArtifactState::Pending {
                return RemoveOutcome::InUse;
            }
            // Expired records are never handed out again, even while deferred
            record.state = ArtifactState::Expired;
            if record.ref_count > 0 {
                return RemoveOutcome::InUse;
            }
            record.path.clone()
        };

        let outcome = match fs::remove_file(&path) {
            Ok(()) => RemoveOutcome::Removed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(artifact_id = %id, "File already absent");
                RemoveOutcome::AlreadyGone
            }
            Err(e) => {
                tracing::warn!(artifact_id = %id, error = %e, "Failed to delete artifact");
                return RemoveOutcome::Failed;
            }
        };

        lock(&self.inner.registry).remove(id);
        outcome
    }

    pub fn get(&self, id: &ArtifactId) -> Option<ArtifactRecord> {
        lock(&self.inner.registry).get(id).cloned()
    }

    pub fn stats(&self) -> StoreStats {
        let registry = lock(&self.inner.registry);
        let mut stats = StoreStats::default();
        for record in registry.values() {
            match record.state {
                ArtifactState::Pending => stats.pending += 1,
                ArtifactState::Ready => stats.ready += 1,
                ArtifactState::Expired => stats.expired += 1,
                ArtifactState::Deleted => {}
            }
            if occupies_root(record) {
                stats.file_count += 1;
                stats.total_bytes += record.size;
            }
            stats.active_readers += record.ref_count;
        }
        stats
    }

    /// Mark every ready record older than the retention window as expired and
    /// return how many were newly expired plus every expired id.
    pub(crate) fn expire_due(&self, now: OffsetDateTime) -> (usize, Vec<ArtifactId>) {
        let max_age = self.inner.retention.max_age;
        let mut registry = lock(&self.inner.registry);
        let mut newly = 0;
        let mut expired = Vec::new();

        for record in registry.values_mut() {
            if record.state == ArtifactState::Ready && age_exceeds(now, record.created_at, max_age) {
                record.state = ArtifactState::Expired;
                newly += 1;
            }
            if record.state == ArtifactState::Expired {
                expired.push(record.id);
            }
        }
        (newly, expired)
    }

    fn fits(&self, incoming: u64) -> bool {
        fits_locked(&lock(&self.inner.registry), self.inner.capacity, incoming)
    }

    fn storage_full(&self, incoming: u64) -> ServiceError {
        let stats = self.stats();
        tracing::warn!(
            incoming,
            total_bytes = stats.total_bytes,
            file_count = stats.file_count,
            "Rejecting download, storage ceiling exceeded"
        );
        ServiceError::StorageFull("Server storage is full, please try again later".to_string())
    }

    fn release(&self, id: &ArtifactId) {
        if let Some(record) = lock(&self.inner.registry).get_mut(id) {
            record.ref_count = record.ref_count.saturating_sub(1);
        }
    }

    fn abandon(&self, id: &ArtifactId, staging_dir: &Path) {
        {
            let mut registry = lock(&self.inner.registry);
            if registry.get(id).is_some_and(|r| r.state == ArtifactState::Pending) {
                registry.remove(id);
            }
        }
        if let Err(e) = fs::remove_dir_all(staging_dir) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(artifact_id = %id, error = %e, "Failed to clear staging directory");
            }
        }
    }
}

fn occupies_root(record: &ArtifactRecord) -> bool {
    matches!(record.state, ArtifactState::Ready | ArtifactState::Expired)
}

fn fits_locked(
    registry: &HashMap<ArtifactId, ArtifactRecord>,
    limits: CapacityLimits,
    incoming: u64,
) -> bool {
    let (files, bytes) = registry
        .values()
        .filter(|r| occupies_root(r))
        .fold((0usize, 0u64), |(n, b), r| (n + 1, b + r.size));

    let bytes_ok = limits
        .max_total_bytes
        .map_or(true, |max| bytes.saturating_add(incoming) <= max);
    let files_ok = limits.max_files.map_or(true, |max| files < max);
    bytes_ok && files_ok
}

/// `<32 hex>.<ext>` names are ours; anything else is foreign
fn adoptable_id(path: &Path) -> Option<ArtifactId> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    if sanitize_extension(Some(ext)) != ext {
        return None;
    }
    ArtifactId::parse(stem)
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Different filesystem: copy then drop the source
            if let Err(e) = fs::copy(from, to) {
                discard_file(to);
                return Err(e);
            }
            fs::remove_file(from)
        }
    }
}

fn discard_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to discard file");
        }
    }
}

/// Reservation for a download in progress. Dropping it without a successful
/// `register` removes the record and everything written to staging.
pub struct PendingArtifact {
    store: ArtifactStore,
    id: ArtifactId,
    staging_dir: PathBuf,
    committed: bool,
}

impl PendingArtifact {
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if !self.committed {
            self.store.abandon(&self.id, &self.staging_dir);
        }
    }
}

/// Read pin on a ready artifact; the sweeper will not delete the file while
/// any lease is alive.
pub struct ArtifactLease {
    store: ArtifactStore,
    id: ArtifactId,
    path: PathBuf,
    size: u64,
    file_name: String,
    extension: String,
}

impl ArtifactLease {
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Name offered to the client for the attachment
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub async fn open(&self) -> Result<tokio::fs::File, ServiceError> {
        tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| ServiceError::io("Failed to open artifact", e))
    }
}

impl std::fmt::Debug for ArtifactLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactLease")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("file_name", &self.file_name)
            .finish()
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        self.store.release(&self.id);
    }
}
