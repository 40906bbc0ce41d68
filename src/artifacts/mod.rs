// Artifact lifecycle: request identity, in-flight dedup, on-disk store and retention

pub mod clock;
pub mod gate;
pub mod record;
pub mod source_key;
pub mod store;
pub mod sweeper;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{AbandonPolicy, GateKey, OperationKind, RequestGate, Role, Ticket};
pub use record::{ArtifactId, ArtifactRecord, ArtifactState};
pub use source_key::SourceKey;
pub use store::{
    ArtifactLease, ArtifactStore, CapacityLimits, PendingArtifact, RecoveryReport, RemoveOutcome,
    StoreConfig, StoreStats,
};
pub use sweeper::{RetentionPolicy, RetentionSweeper, SweepReport};

/// Registry locks guard plain bookkeeping; a panic while holding one
/// leaves nothing half-written worth refusing to read.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
