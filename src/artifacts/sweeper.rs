// Retention sweeper: expires artifacts older than the retention window and
// deletes them once no reader holds a lease.

use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::store::{ArtifactStore, RemoveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Age after which an artifact becomes eligible for deletion
    pub max_age: Duration,
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records that crossed the retention window during this sweep
    pub expired: usize,
    pub removed: usize,
    /// Still leased; retried next sweep
    pub deferred: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// One pass over the registry. Per-record failures are counted, never fatal.
#[tracing::instrument(skip_all, fields(sweep.operation = "retention"))]
pub fn sweep(store: &ArtifactStore) -> SweepReport {
    let started = Instant::now();
    let now = store.clock().now();
    let (expired, candidates) = store.expire_due(now);

    let mut report = SweepReport {
        expired,
        ..SweepReport::default()
    };
    for id in candidates {
        match store.remove(&id) {
            RemoveOutcome::Removed | RemoveOutcome::AlreadyGone => report.removed += 1,
            RemoveOutcome::InUse => {
                tracing::debug!(artifact_id = %id, "Artifact still being read, deferring");
                report.deferred += 1;
            }
            RemoveOutcome::Failed => report.failed += 1,
        }
    }
    report.duration_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        expired = report.expired,
        removed = report.removed,
        deferred = report.deferred,
        failed = report.failed,
        duration_ms = report.duration_ms,
        "Retention sweep finished"
    );
    report
}

pub struct RetentionSweeper {
    store: ArtifactStore,
    every: Duration,
}

impl RetentionSweeper {
    pub fn new(store: ArtifactStore) -> Self {
        let every = store.retention().sweep_interval;
        Self { store, every }
    }

    pub fn sweep_once(&self) -> SweepReport {
        sweep(&self.store)
    }

    /// Spawn the periodic loop; the first sweep runs immediately.
    /// Returns a JoinHandle that resolves after `shutdown` is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = self.every.as_secs(), "Retention sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let store = self.store.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || sweep(&store)).await {
                            tracing::error!(error = %e, "Retention sweep task failed");
                        }
                    }
                }
            }
            tracing::info!("Retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::clock::ManualClock;
    use crate::artifacts::record::ArtifactState;
    use crate::artifacts::source_key::SourceKey;
    use crate::artifacts::store::StoreConfig;
    use std::sync::Arc;

    fn setup(dir: &std::path::Path) -> (ArtifactStore, ManualClock) {
        let clock = ManualClock::default();
        let store = ArtifactStore::open(StoreConfig::new(dir), Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    fn produce(store: &ArtifactStore) -> crate::artifacts::ArtifactRecord {
        let source = SourceKey::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();
        let pending = store.reserve(&source).unwrap();
        let media = pending.staging_dir().join("media.webm");
        std::fs::write(&media, b"bytes").unwrap();
        store.register(pending, &media, "clip").unwrap()
    }

    #[test]
    fn test_nothing_expires_inside_window() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = setup(dir.path());
        let record = produce(&store);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(sweep(&store).removed, 0);
        assert_eq!(store.get(&record.id).unwrap().state, ArtifactState::Ready);
    }

    #[test]
    fn test_leased_artifact_deferred_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = setup(dir.path());
        let record = produce(&store);

        // Sweeps at T+3600, T+3900, T+4200; a 120s download starts at T+3780
        clock.advance(Duration::from_secs(3600));
        let report = sweep(&store);
        assert_eq!((report.expired, report.removed), (0, 0));

        clock.advance(Duration::from_secs(180));
        let lease = store.resolve(&record.id.to_string()).unwrap();

        clock.advance(Duration::from_secs(120));
        let report = sweep(&store);
        assert_eq!((report.expired, report.removed, report.deferred), (1, 0, 1));
        assert!(record.path.exists());
        assert!(store.resolve(&record.id.to_string()).is_err());
        drop(lease);

        clock.advance(Duration::from_secs(300));
        let report = sweep(&store);
        assert_eq!((report.expired, report.removed, report.deferred), (0, 1, 0));
        assert!(!record.path.exists());
        assert!(store.get(&record.id).is_none());
    }

    #[test]
    fn test_one_failure_does_not_stop_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = setup(dir.path());
        let a = produce(&store);
        let b = produce(&store);

        // A file replaced by a non-empty directory cannot be removed with remove_file
        std::fs::remove_file(&a.path).unwrap();
        std::fs::create_dir(&a.path).unwrap();
        std::fs::write(a.path.join("x"), b"x").unwrap();

        clock.advance(Duration::from_secs(3601));
        let report = sweep(&store);
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 1);
        assert!(!b.path.exists());
        assert_eq!(store.get(&a.id).unwrap().state, ArtifactState::Expired);
    }

    #[tokio::test]
    async fn test_loop_sweeps_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = setup(dir.path());
        let record = produce(&store);
        clock.advance(Duration::from_secs(4000));

        let token = CancellationToken::new();
        let handle = RetentionSweeper::new(store.clone()).start(token.clone());

        for _ in 0..50 {
            if store.get(&record.id).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.get(&record.id).is_none());

        token.cancel();
        handle.await.unwrap();
    }
}
