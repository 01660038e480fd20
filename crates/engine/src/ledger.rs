//! Run creation and the run state machine.

use std::sync::Arc;

use tracing::{info, instrument};

use reflex_core::{RuleId, RuleRun, RunId, RunStatus, TriggerSnapshot, TriggerSource};
use reflex_state::{RunStore, StateError};

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The run was cancelled.
    Cancelled(RunStatus),
    /// The run was already terminal; nothing changed. Carries the current
    /// status so callers can report it.
    AlreadyFinished(RunStatus),
}

/// Creates and transitions [`RuleRun`] records.
///
/// All three trigger sources create runs through the ledger; the execution
/// worker drives them to a terminal state through it.
#[derive(Clone)]
pub struct RunLedger {
    runs: Arc<dyn RunStore>,
}

impl RunLedger {
    #[must_use]
    pub fn new(runs: Arc<dyn RunStore>) -> Self {
        Self { runs }
    }

    /// Create a pending run for a rule, snapshotting the trigger data.
    #[instrument(skip(self, snapshot), fields(rule_id = %rule_id))]
    pub async fn create_run(
        &self,
        rule_id: RuleId,
        source: TriggerSource,
        snapshot: TriggerSnapshot,
    ) -> Result<RuleRun, StateError> {
        let run = RuleRun::new(rule_id, source, snapshot);
        self.runs.insert_run(run.clone()).await?;
        info!(run_id = %run.id, source = ?source, "run created");
        Ok(run)
    }

    /// Mark a run as picked up by a worker. Fails with
    /// [`StateError::IllegalTransition`] if the run was cancelled first.
    pub async fn mark_running(&self, id: &RunId) -> Result<RuleRun, StateError> {
        self.runs.transition_run(id, RunStatus::Running, None).await
    }

    /// Record successful completion of all actions.
    pub async fn complete(&self, id: &RunId) -> Result<RuleRun, StateError> {
        self.runs
            .transition_run(id, RunStatus::Completed, None)
            .await
    }

    /// Record a failed run with the failing action's message.
    pub async fn fail(&self, id: &RunId, error: impl Into<String>) -> Result<RuleRun, StateError> {
        self.runs
            .transition_run(id, RunStatus::Failed, Some(error.into()))
            .await
    }

    /// Request cancellation.
    ///
    /// Accepted while pending or running; on a terminal run this is a no-op
    /// that reports the current status instead of erroring. The signal is
    /// cooperative -- a running action is not interrupted, but no further
    /// actions in that run will start.
    pub async fn cancel(&self, id: &RunId) -> Result<CancelOutcome, StateError> {
        match self
            .runs
            .transition_run(id, RunStatus::Cancelled, None)
            .await
        {
            Ok(run) => Ok(CancelOutcome::Cancelled(run.status)),
            Err(StateError::IllegalTransition { from, .. }) if from.is_terminal() => {
                Ok(CancelOutcome::AlreadyFinished(from))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a run by id.
    pub async fn get(&self, id: &RunId) -> Result<Option<RuleRun>, StateError> {
        self.runs.get_run(id).await
    }

    /// List a rule's runs, newest first.
    pub async fn list_for_rule(&self, rule_id: &RuleId) -> Result<Vec<RuleRun>, StateError> {
        self.runs.list_runs(rule_id).await
    }
}
