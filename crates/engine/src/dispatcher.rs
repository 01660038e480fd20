//! Periodic evaluation of schedule-triggered rules.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use reflex_core::cron::{next_occurrence, validate_cron_expr, validate_timezone};
use reflex_core::{AutomationRule, TriggerConfig, TriggerSnapshot, TriggerSource};
use reflex_state::{ClaimResult, RuleStore};

use crate::error::EngineError;
use crate::ledger::RunLedger;
use crate::worker::{QueuedRun, RunQueue};

/// Upper bound on occurrences scanned per rule per tick. A rule that fell
/// further behind catches up over subsequent ticks.
const MAX_CATCHUP_STEPS: usize = 1_000;

/// Evaluates cron schedules and creates runs for due instants.
///
/// Several dispatcher instances may tick concurrently against a shared store;
/// the conditional `claim_schedule_fire` write guarantees each due instant
/// fires at most once. Missed occurrences (downtime, slow ticks) collapse
/// into a single run at the latest due instant.
pub struct ScheduleDispatcher {
    rules: Arc<dyn RuleStore>,
    ledger: RunLedger,
    queue: RunQueue,
    interval: Duration,
}

impl ScheduleDispatcher {
    #[must_use]
    pub fn new(
        rules: Arc<dyn RuleStore>,
        ledger: RunLedger,
        queue: RunQueue,
        interval: Duration,
    ) -> Self {
        Self {
            rules,
            ledger,
            queue,
            interval,
        }
    }

    /// Tick until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "schedule dispatcher started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        warn!(error = %e, "schedule tick failed");
                    }
                }
            }
        }
        info!("schedule dispatcher stopped");
    }

    /// Evaluate all schedule rules against `now`; returns the number of runs
    /// created. Taking the clock as a parameter keeps ticks testable.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let mut fired = 0;
        for rule in self.rules.list_schedule_rules().await? {
            if self.fire_if_due(&rule, now).await? {
                fired += 1;
            }
        }
        Ok(fired)
    }

    async fn fire_if_due(
        &self,
        rule: &AutomationRule,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let TriggerConfig::Schedule {
            cron,
            timezone,
            last_fired_at,
        } = &rule.trigger
        else {
            return Ok(false);
        };

        // Both were validated at rule creation; a store entry that fails to
        // parse is skipped rather than poisoning the whole tick.
        let (Ok(cron_expr), Ok(tz)) = (validate_cron_expr(cron), validate_timezone(timezone))
        else {
            warn!(rule_id = %rule.id, cron, timezone, "stored schedule no longer parses, skipping");
            return Ok(false);
        };

        let anchor = last_fired_at.unwrap_or(rule.created_at);
        let Some(due) = latest_due(&cron_expr, tz, anchor, now) else {
            return Ok(false);
        };

        match self.rules.claim_schedule_fire(&rule.id, due).await? {
            ClaimResult::Claimed => {}
            ClaimResult::AlreadyFired { last_fired_at } => {
                debug!(rule_id = %rule.id, ?last_fired_at, "instant already claimed");
                return Ok(false);
            }
        }

        let snapshot = TriggerSnapshot {
            payload: serde_json::json!({
                "scheduled_for": due.to_rfc3339(),
                "cron": cron,
                "timezone": timezone,
            }),
            source_ip: None,
            event_id: None,
        };
        let run = self
            .ledger
            .create_run(rule.id.clone(), TriggerSource::Schedule, snapshot)
            .await?;
        debug!(rule_id = %rule.id, run_id = %run.id, scheduled_for = %due, "schedule fired");
        self.queue
            .enqueue(QueuedRun {
                rule: rule.clone(),
                run,
            })
            .await?;
        Ok(true)
    }
}

/// Latest cron occurrence strictly after `anchor` and not after `now`.
fn latest_due(
    cron: &croner::Cron,
    tz: chrono_tz::Tz,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut cursor = anchor;
    let mut due = None;
    for _ in 0..MAX_CATCHUP_STEPS {
        match next_occurrence(cron, tz, &cursor) {
            Some(next) if next <= now => {
                due = Some(next);
                cursor = next;
            }
            _ => break,
        }
    }
    due
}
