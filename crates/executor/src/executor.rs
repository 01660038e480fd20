use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use reflex_core::ActionSpec;

use crate::collaborators::{InternalActionRegistry, SignedDelivery, WebhookSender};
use crate::context::ActionContext;
use crate::template::render_payload;

/// Result of executing one run's action list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every action executed without error.
    Completed,
    /// An action failed; later actions were never attempted.
    Failed {
        /// 0-based position of the failing action.
        action_index: usize,
        /// Name of the failing action (registry name or target URL).
        action: String,
        /// The collaborator's error message, recorded on the run.
        message: String,
    },
    /// A cancellation arrived between actions; execution stopped without
    /// marking failure.
    Cancelled {
        /// Number of actions that had already executed.
        executed: usize,
    },
}

/// Observes external cancellation between actions.
///
/// Cancellation is cooperative: the probe is consulted before each action
/// starts, and a running action is never forcibly interrupted.
#[async_trait]
pub trait CancellationProbe: Send + Sync {
    async fn is_cancelled(&self) -> bool;
}

/// Probe for contexts where cancellation cannot occur.
pub struct NeverCancelled;

#[async_trait]
impl CancellationProbe for NeverCancelled {
    async fn is_cancelled(&self) -> bool {
        false
    }
}

/// Executes a run's action list strictly in declared order.
///
/// Actions within one run never parallelize; one executor instance is shared
/// by all concurrently executing runs and holds no per-run state.
pub struct ActionExecutor {
    registry: Arc<dyn InternalActionRegistry>,
    sender: Arc<dyn WebhookSender>,
}

impl ActionExecutor {
    #[must_use]
    pub fn new(
        registry: Arc<dyn InternalActionRegistry>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self { registry, sender }
    }

    /// Run the action list for one run.
    ///
    /// Stops at the first failing action and reports it; the caller (the run
    /// worker) translates the outcome into a terminal run status.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, actions = actions.len()))]
    pub async fn execute_run(
        &self,
        actions: &[ActionSpec],
        ctx: &ActionContext,
        cancel: &dyn CancellationProbe,
    ) -> ExecutionOutcome {
        for (index, action) in actions.iter().enumerate() {
            if cancel.is_cancelled().await {
                debug!(executed = index, "run cancelled between actions");
                return ExecutionOutcome::Cancelled { executed: index };
            }
            if let Err((name, message)) = self.execute_action(action, ctx).await {
                warn!(action = %name, index, error = %message, "action failed, aborting run");
                return ExecutionOutcome::Failed {
                    action_index: index,
                    action: name,
                    message,
                };
            }
        }
        ExecutionOutcome::Completed
    }

    async fn execute_action(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
    ) -> Result<(), (String, String)> {
        match action {
            ActionSpec::InternalAction { action, params } => {
                debug!(action = %action, "dispatching internal action");
                self.registry
                    .execute(action, params, ctx)
                    .await
                    .map(|_| ())
                    .map_err(|e| (action.clone(), e.to_string()))
            }
            ActionSpec::Webhook {
                url,
                method,
                payload_template,
            } => {
                let body = render_payload(payload_template, &ctx.template_vars())
                    .map_err(|e| (url.clone(), e.to_string()))?;
                let timestamp = Utc::now().timestamp();
                let signature =
                    reflex_crypto::sign_header(&ctx.signing_secret, timestamp, body.as_bytes());
                debug!(url = %url, method = method.as_str(), "delivering outbound webhook");
                self.sender
                    .deliver(SignedDelivery {
                        url: url.clone(),
                        method: *method,
                        body,
                        timestamp,
                        signature,
                    })
                    .await
                    .map_err(|e| (url.clone(), e.to_string()))
            }
        }
    }
}
