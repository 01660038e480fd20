//! In-memory backend for [`RuleStore`] and [`RunStore`].
//!
//! Backed by `DashMap`; per-entry locking gives the atomicity the store
//! contracts require (schedule-fire claims, guarded run transitions) without
//! a global lock. Suitable for tests and single-node deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use reflex_core::{
    AutomationRule, RuleId, RuleRun, RunId, RunStatus, TenantId, TriggerConfig,
};
use reflex_state::{ClaimResult, RuleStore, RunStore, StateError};

/// In-memory rule and run store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rules: DashMap<RuleId, AutomationRule>,
    runs: DashMap<RunId, RuleRun>,
    /// Secondary index: webhook path -> rule id. Paths are never reused, so
    /// entries are kept even after soft deletion.
    paths: DashMap<String, RuleId>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the rule's webhook path in the index, if it has one.
    fn reserve_path(&self, rule: &AutomationRule) -> Result<(), StateError> {
        let Some(path) = rule.webhook_path() else {
            return Ok(());
        };
        match self.paths.entry(path.to_owned()) {
            Entry::Occupied(existing) if existing.get() != &rule.id => {
                Err(StateError::DuplicateWebhookPath(path.to_owned()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(rule.id.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn insert_rule(&self, rule: AutomationRule) -> Result<(), StateError> {
        self.reserve_path(&rule)?;
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn get_rule(&self, id: &RuleId) -> Result<Option<AutomationRule>, StateError> {
        Ok(self.rules.get(id).map(|r| r.clone()))
    }

    async fn update_rule(&self, rule: AutomationRule) -> Result<(), StateError> {
        if !self.rules.contains_key(&rule.id) {
            return Err(StateError::NotFound(rule.id.to_string()));
        }
        self.reserve_path(&rule)?;
        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn soft_delete_rule(&self, id: &RuleId, at: DateTime<Utc>) -> Result<(), StateError> {
        let mut rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        rule.deleted_at = Some(at);
        rule.updated_at = at;
        Ok(())
    }

    async fn find_by_webhook_path(
        &self,
        path: &str,
    ) -> Result<Option<AutomationRule>, StateError> {
        let Some(rule_id) = self.paths.get(path).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.rules.get(&rule_id).map(|r| r.clone()))
    }

    async fn list_event_rules(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Vec<AutomationRule>, StateError> {
        Ok(self
            .rules
            .iter()
            .filter(|r| {
                r.is_active()
                    && r.tenant_id == *tenant_id
                    && matches!(
                        &r.trigger,
                        TriggerConfig::Event { event_type: et, .. } if et == event_type
                    )
            })
            .map(|r| r.clone())
            .collect())
    }

    async fn list_schedule_rules(&self) -> Result<Vec<AutomationRule>, StateError> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.is_active() && matches!(r.trigger, TriggerConfig::Schedule { .. }))
            .map(|r| r.clone())
            .collect())
    }

    async fn list_rules(&self, tenant_id: &TenantId) -> Result<Vec<AutomationRule>, StateError> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.tenant_id == *tenant_id && r.deleted_at.is_none())
            .map(|r| r.clone())
            .collect())
    }

    async fn claim_schedule_fire(
        &self,
        id: &RuleId,
        instant: DateTime<Utc>,
    ) -> Result<ClaimResult, StateError> {
        // get_mut holds the shard lock for the entry, making the
        // compare-and-update a single atomic step.
        let mut rule = self
            .rules
            .get_mut(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        let TriggerConfig::Schedule {
            ref mut last_fired_at,
            ..
        } = rule.trigger
        else {
            return Err(StateError::Backend(format!(
                "rule {id} is not schedule-triggered"
            )));
        };
        match *last_fired_at {
            Some(last) if last >= instant => Ok(ClaimResult::AlreadyFired {
                last_fired_at: Some(last),
            }),
            _ => {
                *last_fired_at = Some(instant);
                Ok(ClaimResult::Claimed)
            }
        }
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn insert_run(&self, run: RuleRun) -> Result<(), StateError> {
        self.runs.insert(run.id.clone(), run);
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<RuleRun>, StateError> {
        Ok(self.runs.get(id).map(|r| r.clone()))
    }

    async fn list_runs(&self, rule_id: &RuleId) -> Result<Vec<RuleRun>, StateError> {
        let mut runs: Vec<RuleRun> = self
            .runs
            .iter()
            .filter(|r| r.rule_id == *rule_id)
            .map(|r| r.clone())
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn transition_run(
        &self,
        id: &RunId,
        next: RunStatus,
        error: Option<String>,
    ) -> Result<RuleRun, StateError> {
        let mut run = self
            .runs
            .get_mut(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        if !run.status.can_transition(next) {
            return Err(StateError::IllegalTransition {
                from: run.status,
                to: next,
            });
        }
        let now = Utc::now();
        run.status = next;
        match next {
            RunStatus::Running => run.started_at = Some(now),
            RunStatus::Completed | RunStatus::Cancelled => run.completed_at = Some(now),
            RunStatus::Failed => {
                run.completed_at = Some(now);
                run.error = error;
            }
            RunStatus::Pending => {}
        }
        Ok(run.clone())
    }
}
