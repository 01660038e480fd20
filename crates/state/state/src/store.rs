use async_trait::async_trait;
use chrono::{DateTime, Utc};

use reflex_core::{AutomationRule, RuleId, RuleRun, RunId, RunStatus, TenantId};

use crate::error::StateError;

/// Result of an atomic schedule-fire claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// This caller won the claim; it must create the run.
    Claimed,
    /// Another dispatcher already claimed this instant (or a later one).
    AlreadyFired {
        last_fired_at: Option<DateTime<Utc>>,
    },
}

/// Trait for persisting automation rules.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Insert a new rule. Fails with [`StateError::DuplicateWebhookPath`] if
    /// the rule has a webhook trigger whose path is already taken.
    async fn insert_rule(&self, rule: AutomationRule) -> Result<(), StateError>;

    /// Fetch a rule by id. Soft-deleted rules are still returned so that
    /// historical runs stay resolvable; callers check `is_active`.
    async fn get_rule(&self, id: &RuleId) -> Result<Option<AutomationRule>, StateError>;

    /// Replace an existing rule (matched by id). `updated_at` is the caller's
    /// responsibility. Webhook path uniqueness is re-checked.
    async fn update_rule(&self, rule: AutomationRule) -> Result<(), StateError>;

    /// Soft-delete a rule: it never triggers again, but remains queryable.
    async fn soft_delete_rule(&self, id: &RuleId, at: DateTime<Utc>) -> Result<(), StateError>;

    /// Look up a rule by webhook path, across all tenants. The path is the
    /// sole routing key for inbound hooks.
    async fn find_by_webhook_path(
        &self,
        path: &str,
    ) -> Result<Option<AutomationRule>, StateError>;

    /// List active (enabled, not deleted) event-triggered rules for a tenant
    /// with the given event type.
    async fn list_event_rules(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Vec<AutomationRule>, StateError>;

    /// List active schedule-triggered rules across all tenants.
    async fn list_schedule_rules(&self) -> Result<Vec<AutomationRule>, StateError>;

    /// List rules for a tenant (active and disabled, not deleted).
    async fn list_rules(&self, tenant_id: &TenantId) -> Result<Vec<AutomationRule>, StateError>;

    /// Atomically claim the scheduled firing `instant` for a rule.
    ///
    /// Succeeds only when the stored `last_fired_at` is absent or strictly
    /// before `instant`; on success the stored value becomes `instant`. The
    /// comparison and update are a single atomic step so that concurrent
    /// dispatcher ticks fire a given instant at most once.
    async fn claim_schedule_fire(
        &self,
        id: &RuleId,
        instant: DateTime<Utc>,
    ) -> Result<ClaimResult, StateError>;
}

/// Trait for persisting rule runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a newly created (pending) run.
    async fn insert_run(&self, run: RuleRun) -> Result<(), StateError>;

    /// Fetch a run by id.
    async fn get_run(&self, id: &RunId) -> Result<Option<RuleRun>, StateError>;

    /// List runs belonging to a rule, newest first.
    async fn list_runs(&self, rule_id: &RuleId) -> Result<Vec<RuleRun>, StateError>;

    /// Atomically transition a run to `next`.
    ///
    /// The stored status is checked against
    /// [`RunStatus::can_transition`]; an illegal transition fails with
    /// [`StateError::IllegalTransition`] and leaves the record untouched.
    /// `started_at`/`completed_at` are stamped as appropriate, and `error`
    /// is recorded when `next` is `Failed`.
    async fn transition_run(
        &self,
        id: &RunId,
        next: RunStatus,
        error: Option<String>,
    ) -> Result<RuleRun, StateError>;
}
