//! Bounded run queue and the worker pool that drains it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use reflex_core::{AutomationRule, RuleRun, RunId, RunStatus, TriggerConfig};
use reflex_executor::{
    ActionContext, ActionExecutor, CancellationProbe, ExecutionOutcome, RetryStrategy,
};
use reflex_state::{RunStore, StateError};

use crate::error::EngineError;
use crate::ledger::RunLedger;

/// A pending run handed from an ingestion path to the worker.
///
/// The rule is snapshotted at enqueue time; a concurrent update or disable
/// does not affect runs already accepted.
#[derive(Debug, Clone)]
pub struct QueuedRun {
    pub rule: AutomationRule,
    pub run: RuleRun,
}

/// Sending half of the run queue.
#[derive(Clone)]
pub struct RunQueue {
    tx: mpsc::Sender<QueuedRun>,
}

impl RunQueue {
    /// Create a bounded queue. The receiver goes to [`RunWorker::run`].
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<QueuedRun>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a pending run, waiting for capacity if the queue is full.
    pub async fn enqueue(&self, item: QueuedRun) -> Result<(), EngineError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| EngineError::QueueClosed)
    }
}

/// Cancellation probe backed by the run store.
///
/// The executor consults it before each action; a cancel request lands as a
/// status change, so polling the record is the cooperative signal.
struct StoreCancellationProbe {
    runs: Arc<dyn RunStore>,
    run_id: RunId,
}

#[async_trait]
impl CancellationProbe for StoreCancellationProbe {
    async fn is_cancelled(&self) -> bool {
        match self.runs.get_run(&self.run_id).await {
            Ok(Some(run)) => run.status == RunStatus::Cancelled,
            // On store trouble, keep going; the transition at the end will
            // surface the real error.
            Ok(None) | Err(_) => false,
        }
    }
}

/// Drains the run queue, executing runs concurrently up to a fixed limit.
///
/// Runs from any trigger source converge here; actions within one run stay
/// strictly sequential while distinct runs interleave freely.
pub struct RunWorker {
    ledger: RunLedger,
    runs: Arc<dyn RunStore>,
    executor: Arc<ActionExecutor>,
    /// Signing secret for outbound webhooks of rules without one of their own.
    default_signing_secret: String,
    concurrency: Arc<Semaphore>,
    /// Backoff between attempts to record a run outcome when the store has a
    /// transient failure.
    retry: RetryStrategy,
}

/// Attempts (including the first) to record a run outcome before giving up.
const MAX_RECORD_ATTEMPTS: u32 = 3;

impl RunWorker {
    #[must_use]
    pub fn new(
        ledger: RunLedger,
        runs: Arc<dyn RunStore>,
        executor: Arc<ActionExecutor>,
        default_signing_secret: impl Into<String>,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            ledger,
            runs,
            executor,
            default_signing_secret: default_signing_secret.into(),
            concurrency: Arc::new(Semaphore::new(max_concurrent_runs)),
            retry: RetryStrategy::default(),
        }
    }

    /// Drain the queue until `shutdown` fires or the queue closes.
    ///
    /// Each run executes on its own task under the concurrency limit, so a
    /// slow run never blocks the queue.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<QueuedRun>, shutdown: CancellationToken) {
        info!(permits = self.concurrency.available_permits(), "run worker started");
        loop {
            let item = tokio::select! {
                () = shutdown.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            let permit = match self.concurrency.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                worker.process(item).await;
                drop(permit);
            });
        }
        info!("run worker stopped");
    }

    /// Execute one queued run through its full lifecycle.
    #[instrument(skip_all, fields(run_id = %item.run.id, rule_id = %item.rule.id))]
    pub async fn process(&self, item: QueuedRun) {
        let QueuedRun { rule, run } = item;

        match self.ledger.mark_running(&run.id).await {
            Ok(_) => {}
            // Cancelled while still queued; nothing to execute.
            Err(StateError::IllegalTransition { from, .. }) if from == RunStatus::Cancelled => {
                debug!("run cancelled before start");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to mark run running");
                return;
            }
        }

        let ctx = self.action_context(&rule, &run);
        let probe = StoreCancellationProbe {
            runs: Arc::clone(&self.runs),
            run_id: run.id.clone(),
        };

        // The inner task isolates action panics from the worker loop.
        let executor = Arc::clone(&self.executor);
        let actions = rule.actions.clone();
        let outcome = tokio::spawn(async move {
            executor.execute_run(&actions, &ctx, &probe).await
        })
        .await;

        let terminal = match outcome {
            Ok(ExecutionOutcome::Completed) => Some((RunStatus::Completed, None)),
            Ok(ExecutionOutcome::Failed {
                action_index,
                action,
                message,
            }) => Some((
                RunStatus::Failed,
                Some(format!("action {action_index} ({action}): {message}")),
            )),
            // The store already holds the cancelled status.
            Ok(ExecutionOutcome::Cancelled { executed }) => {
                debug!(executed, "run stopped by cancellation");
                None
            }
            Err(join_err) => {
                error!(error = %join_err, "action task panicked");
                Some((
                    RunStatus::Failed,
                    Some("internal error: action task panicked".to_owned()),
                ))
            }
        };
        if let Some((status, error)) = terminal {
            self.record_outcome(&run.id, status, error).await;
        }
    }

    /// Record a terminal status, backing off on transient store failures.
    async fn record_outcome(&self, id: &RunId, status: RunStatus, error: Option<String>) {
        for attempt in 0..MAX_RECORD_ATTEMPTS {
            match self.runs.transition_run(id, status, error.clone()).await {
                Ok(_) => return,
                Err(StateError::Backend(message)) if attempt + 1 < MAX_RECORD_ATTEMPTS => {
                    warn!(error = %message, attempt, "store failed recording outcome, backing off");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to record run outcome");
                    return;
                }
            }
        }
    }

    fn action_context(&self, rule: &AutomationRule, run: &RuleRun) -> ActionContext {
        // Webhook rules sign outbound deliveries with their own secret;
        // everything else uses the engine-wide default.
        let signing_secret = match &rule.trigger {
            TriggerConfig::Webhook { secret, .. } => secret.expose().to_owned(),
            _ => self.default_signing_secret.clone(),
        };
        ActionContext {
            tenant_id: rule.tenant_id.clone(),
            rule_id: rule.id.clone(),
            run_id: run.id.clone(),
            trigger_source: run.trigger_source,
            trigger: run.trigger_snapshot.clone(),
            signing_secret,
        }
    }
}
