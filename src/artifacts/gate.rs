//! Single-flight gate for extraction work.
//!
//! The first caller for a key becomes the leader and its operation is
//! spawned onto the runtime; callers arriving while it runs become followers
//! and wait on the same completion signal. The operation lives in its own
//! task, so a leader that goes away does not cancel the work its followers
//! are waiting for. Bounding the extraction itself is the operation's job.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::lock;
use super::source_key::SourceKey;
use crate::downloader::QualitySelector;
use crate::error::ServiceError;

type Outcome<T> = Result<T, ServiceError>;
type Slot<T> = watch::Sender<Option<Outcome<T>>>;

/// Metadata and downloads live in separate key spaces; downloads of the
/// same source at different qualities are different operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Info,
    Download(QualitySelector),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GateKey {
    pub source: SourceKey,
    pub kind: OperationKind,
}

impl GateKey {
    pub fn new(source: SourceKey, kind: OperationKind) -> Self {
        Self { source, kind }
    }
}

/// What happens to an operation once nobody is waiting for it any more
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbandonPolicy {
    /// Finish anyway; the work is expensive and a retry may join it
    #[default]
    RunToCompletion,
    /// Abort once the leader and every follower have gone away
    AbortWhenUnobserved,
}

impl FromStr for AbandonPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run-to-completion" | "continue" => Ok(Self::RunToCompletion),
            "abort-when-unobserved" | "abort" => Ok(Self::AbortWhenUnobserved),
            other => Err(format!("unknown abandon policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

/// Handle on an in-flight operation
pub struct Ticket<T> {
    role: Role,
    rx: watch::Receiver<Option<Outcome<T>>>,
}

impl<T: Clone> Ticket<T> {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Wait for the shared outcome
    pub async fn outcome(mut self) -> Outcome<T> {
        let published = match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };
        published.unwrap_or_else(|| {
            Err(ServiceError::ExtractionFailure(
                "The operation was cancelled before it finished".to_string(),
            ))
        })
    }
}

pub struct RequestGate<T> {
    in_flight: Arc<Mutex<HashMap<GateKey, Arc<Slot<T>>>>>,
    policy: AbandonPolicy,
}

impl<T> RequestGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(policy: AbandonPolicy) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    /// Join the operation for `key`, starting it with `op` if none is running.
    ///
    /// `op` is only invoked for the leader.
    pub fn acquire<F, Fut>(&self, key: GateKey, op: F) -> Ticket<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let (slot, rx) = {
            let mut table = lock(&self.in_flight);

            if let Some(existing) = table.get(&key) {
                // An abandoned slot is being torn down; start over instead of joining it
                let abandoned =
                    self.policy == AbandonPolicy::AbortWhenUnobserved && existing.is_closed();
                if !abandoned {
                    tracing::debug!(source = %key.source, kind = ?key.kind, "Joining in-flight operation");
                    return Ticket {
                        role: Role::Follower,
                        rx: existing.subscribe(),
                    };
                }
            }

            // The leader's receiver exists before the slot is visible, so the
            // slot never looks abandoned while it is being set up
            let (tx, rx) = watch::channel(None);
            let slot = Arc::new(tx);
            table.insert(key.clone(), Arc::clone(&slot));
            (slot, rx)
        };

        tracing::debug!(source = %key.source, kind = ?key.kind, "Starting operation");
        self.spawn_leader(key, slot, op());

        Ticket {
            role: Role::Leader,
            rx,
        }
    }

    /// `acquire` followed by waiting for the outcome
    pub async fn run<F, Fut>(&self, key: GateKey, op: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.acquire(key, op).outcome().await
    }

    /// Number of operations currently running
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn spawn_leader<Fut>(&self, key: GateKey, slot: Arc<Slot<T>>, fut: Fut)
    where
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let table = Arc::clone(&self.in_flight);
        let policy = self.policy;

        tokio::spawn(async move {
            let work = tokio::spawn(fut);
            let abort = work.abort_handle();

            let finished = async {
                work.await.unwrap_or_else(|join_err| {
                    Err(ServiceError::Internal(format!(
                        "operation task failed: {}",
                        join_err
                    )))
                })
            };

            let outcome = match policy {
                AbandonPolicy::RunToCompletion => Some(finished.await),
                AbandonPolicy::AbortWhenUnobserved => tokio::select! {
                    outcome = finished => Some(outcome),
                    _ = slot.closed() => None,
                },
            };

            if outcome.is_none() {
                abort.abort();
                tracing::info!(source = %key.source, kind = ?key.kind, "Operation abandoned by every caller, aborted");
            }

            // Remove and publish under the table lock: anyone who subscribed
            // before removal sees the outcome, anyone after starts fresh.
            let mut table = lock(&table);
            if table.get(&key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                table.remove(&key);
            }
            if let Some(outcome) = outcome {
                slot.send_replace(Some(outcome));
            }
        });
    }
}
