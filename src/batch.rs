//! Batch creation with live progress.
//!
//! Progress is observed the way a display surface would see it: by counting
//! `create` broadcasts of the batch's kind on a hub. The tracker subscribes
//! before the first request is issued and unsubscribes once every request has
//! settled. Creates of the same kind made by someone else during the batch
//! are counted too; the reported value never exceeds the batch size.

use crate::core::{EntityKind, Fields, MirrorError, Record, Result};
use crate::gateway::DataGateway;
use crate::notify::{Action, Subscription, SubscriptionHub};
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

impl std::fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSucceeded,
    Partial,
    AllFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub reason: MirrorError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<Record>,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn outcome(&self) -> BatchOutcome {
        match (self.succeeded.is_empty(), self.failures.is_empty()) {
            (_, true) => BatchOutcome::AllSucceeded,
            (true, false) => BatchOutcome::AllFailed,
            (false, false) => BatchOutcome::Partial,
        }
    }
}

/// Counts `create` broadcasts of one kind while attached to a hub.
pub struct BatchProgressTracker {
    total: usize,
    counter: Arc<AtomicUsize>,
    subscription: Subscription,
    progress: watch::Receiver<BatchProgress>,
}

impl BatchProgressTracker {
    pub fn attach(hub: &Arc<SubscriptionHub>, kind: EntityKind, total: usize) -> Self {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, progress) = watch::channel(BatchProgress { done: 0, total });

        let seen = Arc::clone(&counter);
        let subscription = hub.subscribe_scoped(move |record| {
            if record.kind == kind && record.action == Action::Create {
                let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
                tx.send_replace(BatchProgress {
                    done: count.min(total),
                    total,
                });
            }
            Ok(())
        });

        Self {
            total,
            counter,
            subscription,
            progress,
        }
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            done: self.counter.load(Ordering::SeqCst).min(self.total),
            total: self.total,
        }
    }

    pub fn watch(&self) -> watch::Receiver<BatchProgress> {
        self.progress.clone()
    }

    /// Stops counting and returns the final progress.
    pub fn detach(mut self) -> BatchProgress {
        self.subscription.cancel();
        self.progress()
    }
}

/// A running batch.
pub struct BatchJob {
    progress: watch::Receiver<BatchProgress>,
    task: JoinHandle<BatchSummary>,
}

impl BatchJob {
    /// Issues one `create` per payload, all concurrently, with progress
    /// reported through `hub`. Fails up front when the batch is larger than
    /// `batch_limit`.
    pub fn start(
        gateway: Arc<dyn DataGateway>,
        hub: &Arc<SubscriptionHub>,
        kind: EntityKind,
        payloads: Vec<Fields>,
        batch_limit: usize,
    ) -> Result<Self> {
        if payloads.len() > batch_limit {
            return Err(MirrorError::BatchLimitExceeded {
                limit: batch_limit,
                requested: payloads.len(),
            });
        }

        let total = payloads.len();
        let tracker = BatchProgressTracker::attach(hub, kind, total);
        let progress = tracker.watch();
        info!(%kind, total, "batch started");

        let task = tokio::spawn(async move {
            let requests = payloads
                .into_iter()
                .map(|payload| gateway.create(kind, payload));
            let results = join_all(requests).await;

            let mut summary = BatchSummary::default();
            for (index, result) in results.into_iter().enumerate() {
                match result {
                    Ok(record) => summary.succeeded.push(record),
                    Err(reason) => {
                        warn!(%kind, index, error = %reason, "batch item failed");
                        summary.failures.push(BatchFailure { index, reason });
                    }
                }
            }

            let last = tracker.detach();
            debug!(%kind, progress = %last, "batch tracker detached");
            info!(%kind, succeeded = summary.succeeded.len(), failed = summary.failures.len(),
                outcome = ?summary.outcome(), "batch settled");
            summary
        });

        Ok(Self { progress, task })
    }

    pub fn progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress.clone()
    }

    pub async fn finish(self) -> Result<BatchSummary> {
        self.task
            .await
            .map_err(|err| MirrorError::Unknown(format!("batch task failed: {}", err)))
    }
}

/// Runs a batch to completion.
pub async fn create_batch(
    gateway: Arc<dyn DataGateway>,
    hub: &Arc<SubscriptionHub>,
    kind: EntityKind,
    payloads: Vec<Fields>,
    batch_limit: usize,
) -> Result<BatchSummary> {
    BatchJob::start(gateway, hub, kind, payloads, batch_limit)?
        .finish()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RecordId, Value};
    use crate::gateway::MutationGateway;
    use crate::notify::{ChangeNotifier, HubRegistry, TransactionRecord};
    use crate::storage::InMemoryStore;

    fn fixture() -> (Arc<dyn DataGateway>, Arc<SubscriptionHub>) {
        let registry = HubRegistry::new();
        let hub = Arc::new(SubscriptionHub::new("batch"));
        registry.attach(&hub);
        let gateway = MutationGateway::new(Arc::new(InMemoryStore::new()))
            .with_hook(Arc::new(ChangeNotifier::new(registry)));
        (Arc::new(gateway), hub)
    }

    fn named(name: &str) -> Fields {
        Fields::from([("name".to_string(), Value::from(name))])
    }

    #[test]
    fn test_outcome() {
        let record = Record::new(EntityKind::Audio, RecordId::new(), Fields::new());
        let failure = BatchFailure {
            index: 1,
            reason: MirrorError::ConstraintViolation("bad".into()),
        };

        let all = BatchSummary { succeeded: vec![record.clone()], failures: vec![] };
        let partial = BatchSummary { succeeded: vec![record], failures: vec![failure.clone()] };
        let none = BatchSummary { succeeded: vec![], failures: vec![failure] };

        assert_eq!(all.outcome(), BatchOutcome::AllSucceeded);
        assert_eq!(partial.outcome(), BatchOutcome::Partial);
        assert_eq!(none.outcome(), BatchOutcome::AllFailed);
        assert_eq!(BatchSummary::default().outcome(), BatchOutcome::AllSucceeded);
    }

    #[test]
    fn test_tracker_caps_at_total_and_ignores_other_events() {
        let hub = Arc::new(SubscriptionHub::new("batch"));
        let tracker = BatchProgressTracker::attach(&hub, EntityKind::Audio, 2);
        let watch = tracker.watch();

        let audio = |id| {
            Arc::new(TransactionRecord::new(EntityKind::Audio, Action::Create, id, Fields::new()))
        };
        hub.deliver(&Arc::new(TransactionRecord::destroyed(EntityKind::Audio, RecordId::new())));
        hub.deliver(&Arc::new(TransactionRecord::new(
            EntityKind::Video,
            Action::Create,
            RecordId::new(),
            Fields::new(),
        )));
        assert_eq!(tracker.progress().done, 0);

        for _ in 0..3 {
            hub.deliver(&audio(RecordId::new()));
        }
        assert_eq!(*watch.borrow(), BatchProgress { done: 2, total: 2 });

        assert_eq!(tracker.detach(), BatchProgress { done: 2, total: 2 });
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_limit_rejected_up_front() {
        let (gateway, hub) = fixture();
        let payloads = (0..51).map(|i| named(&format!("Track {}", i))).collect();

        let err = create_batch(gateway, &hub, EntityKind::Audio, payloads, 50)
            .await
            .unwrap_err();
        assert_eq!(err, MirrorError::BatchLimitExceeded { limit: 50, requested: 51 });
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_indexes() {
        let (gateway, hub) = fixture();
        let payloads = vec![named("Good one"), named("x"), named("Good two")];

        let job = BatchJob::start(gateway, &hub, EntityKind::Audio, payloads, 50).unwrap();
        let progress = job.progress();
        let summary = job.finish().await.unwrap();

        assert_eq!(summary.outcome(), BatchOutcome::Partial);
        assert_eq!(summary.succeeded.len(), 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].index, 1);
        assert!(matches!(summary.failures[0].reason, MirrorError::ConstraintViolation(_)));
        assert_eq!(*progress.borrow(), BatchProgress { done: 2, total: 3 });
        assert_eq!(hub.listener_count(), 0);
    }
}
