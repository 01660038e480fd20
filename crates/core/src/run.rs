use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EventId, RuleId, RunId};

/// How a run was triggered. Recorded at fire time for audit, even if the
/// rule's trigger configuration later changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Event,
    Webhook,
    Schedule,
}

/// Position of a run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, waiting for a worker. The sole initial state.
    Pending,
    /// A worker is executing the action list.
    Running,
    /// All actions executed without error. Terminal.
    Completed,
    /// An action failed; the run's `error` records the message. Terminal.
    Failed,
    /// Cancelled while pending or running. Terminal.
    Cancelled,
}

impl RunStatus {
    /// Whether this status is terminal (no further transitions permitted).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Legal transitions: `pending → running`, `running → completed|failed`,
    /// and `pending|running → cancelled`. Everything else is rejected,
    /// including any transition out of a terminal state.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed)
                | (Self::Pending | Self::Running, Self::Cancelled)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of whatever triggered a run, captured at trigger time.
///
/// Never recomputed later: the rule configuration may drift after the run is
/// created, but the snapshot records what actually happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    /// Raw trigger payload. For webhook triggers this is the request body
    /// stored verbatim (non-JSON bodies are wrapped as a JSON string).
    pub payload: serde_json::Value,
    /// Source address of the inbound call, for webhook triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// The matched domain event, for event triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
}

/// One instance of a rule firing, tracked to completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRun {
    /// Unique identifier (UUID-v4, assigned on creation).
    pub id: RunId,
    /// The rule this run belongs to. Never reassigned.
    pub rule_id: RuleId,
    pub trigger_source: TriggerSource,
    pub trigger_snapshot: TriggerSnapshot,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuleRun {
    /// Create a pending run for the given rule with a trigger snapshot.
    #[must_use]
    pub fn new(rule_id: RuleId, source: TriggerSource, snapshot: TriggerSnapshot) -> Self {
        Self {
            id: RunId::generate(),
            rule_id,
            trigger_source: source,
            trigger_snapshot: snapshot,
            status: RunStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}
