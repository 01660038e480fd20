//! The engine facade tying ingestion paths to the run pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use reflex_core::{DomainEvent, RuleRun, TriggerSnapshot, TriggerSource};
use reflex_executor::{ActionExecutor, InternalActionRegistry, WebhookSender};
use reflex_state::{RuleStore, RunStore};

use crate::authenticator::{AuthenticateError, InboundWebhook, WebhookAuthenticator};
use crate::dispatcher::ScheduleDispatcher;
use crate::error::EngineError;
use crate::ledger::RunLedger;
use crate::matcher::TriggerMatcher;
use crate::worker::{QueuedRun, RunQueue, RunWorker};

const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_MAX_CONCURRENT_RUNS: usize = 16;
const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(60);

/// Assembles an [`Engine`] and its background [`EngineRuntime`].
pub struct EngineBuilder {
    rules: Arc<dyn RuleStore>,
    runs: Arc<dyn RunStore>,
    registry: Arc<dyn InternalActionRegistry>,
    sender: Arc<dyn WebhookSender>,
    default_signing_secret: Option<String>,
    queue_capacity: usize,
    max_concurrent_runs: usize,
    dispatch_interval: Duration,
}

impl EngineBuilder {
    #[must_use]
    pub fn new(
        rules: Arc<dyn RuleStore>,
        runs: Arc<dyn RunStore>,
        registry: Arc<dyn InternalActionRegistry>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            rules,
            runs,
            registry,
            sender,
            default_signing_secret: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
        }
    }

    /// Secret used to sign outbound webhooks of rules that have no webhook
    /// secret of their own. A fresh one is generated when unset.
    #[must_use]
    pub fn default_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.default_signing_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn max_concurrent_runs(mut self, limit: usize) -> Self {
        self.max_concurrent_runs = limit;
        self
    }

    #[must_use]
    pub fn dispatch_interval(mut self, interval: Duration) -> Self {
        self.dispatch_interval = interval;
        self
    }

    /// Build the engine. The returned runtime must be driven (see
    /// [`EngineRuntime::run`]) for queued runs and schedules to make progress.
    #[must_use]
    pub fn build(self) -> (Engine, EngineRuntime) {
        let (queue, rx) = RunQueue::bounded(self.queue_capacity);
        let ledger = RunLedger::new(Arc::clone(&self.runs));
        let signing_secret = self
            .default_signing_secret
            .unwrap_or_else(reflex_crypto::generate_secret);

        let executor = Arc::new(ActionExecutor::new(self.registry, self.sender));
        let worker = Arc::new(RunWorker::new(
            ledger.clone(),
            Arc::clone(&self.runs),
            executor,
            signing_secret,
            self.max_concurrent_runs,
        ));
        let dispatcher = ScheduleDispatcher::new(
            Arc::clone(&self.rules),
            ledger.clone(),
            queue.clone(),
            self.dispatch_interval,
        );

        let engine = Engine {
            authenticator: WebhookAuthenticator::new(Arc::clone(&self.rules)),
            matcher: TriggerMatcher::new(Arc::clone(&self.rules)),
            ledger,
            queue,
        };
        let runtime = EngineRuntime {
            worker,
            rx,
            dispatcher,
        };
        (engine, runtime)
    }
}

/// Ingestion front door shared by the HTTP layer.
///
/// Cheap to clone is not needed; the server wraps it in an `Arc`.
pub struct Engine {
    authenticator: WebhookAuthenticator,
    matcher: TriggerMatcher,
    ledger: RunLedger,
    queue: RunQueue,
}

impl Engine {
    /// Authenticate an inbound webhook call and, on success, create and
    /// enqueue a pending run. The raw body is snapshotted verbatim; non-JSON
    /// bodies are wrapped as a JSON string.
    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn ingest_webhook(
        &self,
        request: &InboundWebhook<'_>,
    ) -> Result<RuleRun, EngineError> {
        let rule = self.authenticator.authenticate(request).await?;

        let snapshot = TriggerSnapshot {
            payload: snapshot_body(request.body),
            source_ip: Some(request.source_ip.to_string()),
            event_id: None,
        };
        let run = self
            .ledger
            .create_run(rule.id.clone(), TriggerSource::Webhook, snapshot)
            .await?;
        self.queue
            .enqueue(QueuedRun {
                rule,
                run: run.clone(),
            })
            .await?;
        Ok(run)
    }

    /// Fan a domain event out to every matching rule, one run per match.
    ///
    /// Matches are independent; a failure to enqueue one run does not unwind
    /// runs already created.
    #[instrument(skip_all, fields(tenant = %event.tenant_id, event_type = %event.event_type))]
    pub async fn ingest_event(&self, event: &DomainEvent) -> Result<Vec<RuleRun>, EngineError> {
        let matches = self.matcher.matching_rules(event).await?;
        debug!(matches = matches.len(), "event matched rules");

        let payload = serde_json::to_value(event).unwrap_or_default();
        let mut runs = Vec::with_capacity(matches.len());
        for rule in matches {
            let snapshot = TriggerSnapshot {
                payload: payload.clone(),
                source_ip: None,
                event_id: Some(event.id.clone()),
            };
            let run = self
                .ledger
                .create_run(rule.id.clone(), TriggerSource::Event, snapshot)
                .await?;
            self.queue
                .enqueue(QueuedRun {
                    rule,
                    run: run.clone(),
                })
                .await?;
            runs.push(run);
        }
        Ok(runs)
    }

    /// Run bookkeeping: status queries and cancellation.
    #[must_use]
    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }
}

impl From<AuthenticateError> for EngineError {
    fn from(err: AuthenticateError) -> Self {
        match err {
            AuthenticateError::Rejected(e) => Self::Auth(e),
            AuthenticateError::State(e) => Self::State(e),
        }
    }
}

/// Background tasks owned by the engine: the run worker and the schedule
/// dispatcher.
pub struct EngineRuntime {
    worker: Arc<RunWorker>,
    rx: mpsc::Receiver<QueuedRun>,
    dispatcher: ScheduleDispatcher,
}

impl EngineRuntime {
    /// Drive both background loops until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("engine runtime started");
        let worker = tokio::spawn(self.worker.run(self.rx, shutdown.clone()));
        let dispatcher = tokio::spawn(self.dispatcher.run(shutdown));
        let _ = tokio::join!(worker, dispatcher);
        info!("engine runtime stopped");
    }
}

fn snapshot_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(body).into_owned())
    })
}
