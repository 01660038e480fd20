use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allowlist::IpAllowlist;
use crate::types::{AgentId, RuleId, StudioId, TenantId};

/// Ownership scope of an automation rule.
///
/// A rule is owned by exactly one of: the tenant itself, a single agent, or a
/// single studio. The enum makes the mutual exclusion structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleScope {
    /// Tenant-global rule, not tied to an agent or studio.
    Tenant,
    /// Rule owned by a single agent.
    Agent { agent_id: AgentId },
    /// Rule owned by a studio.
    Studio { studio_id: StudioId },
}

impl RuleScope {
    /// The owning agent, if this is an agent-scoped rule.
    #[must_use]
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Self::Agent { agent_id } => Some(agent_id),
            _ => None,
        }
    }
}

/// Filter applied to event-triggered rules on top of the event type match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionFilter {
    /// Only match when the rule's owning agent is explicitly mentioned in the
    /// event, not merely a participant.
    SelfMention,
}

/// Secret used to sign and verify webhook payloads for one rule.
///
/// The plaintext is available through [`expose`](Self::expose) for signing;
/// `Debug` output is redacted so the value never lands in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(***)")
    }
}

/// Trigger configuration, keyed by the rule's trigger type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Fire when a matching domain event is observed.
    Event {
        /// Event type to match (exact equality).
        event_type: String,
        /// Optional mention filter on top of the type match.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mention_filter: Option<MentionFilter>,
    },
    /// Fire on a signed inbound HTTP call.
    Webhook {
        /// Globally unique routing path under `/hooks/`. Generated once at
        /// creation, never reused.
        path: String,
        /// Signing secret. Generated with the path; rotated only by an
        /// explicit rotation operation.
        secret: WebhookSecret,
        /// Source addresses permitted to call this hook. Empty = allow all.
        #[serde(default)]
        allowed_ips: IpAllowlist,
    },
    /// Fire on a cron schedule.
    Schedule {
        /// Standard 5-field cron expression.
        cron: String,
        /// IANA timezone the expression is evaluated in.
        timezone: String,
        /// The scheduled instant most recently claimed by a dispatcher.
        /// Updated with a conditional write so concurrent dispatchers fire a
        /// given instant at most once.
        #[serde(default)]
        last_fired_at: Option<DateTime<Utc>>,
    },
}

impl TriggerConfig {
    /// The trigger source recorded on runs created from this trigger.
    #[must_use]
    pub fn source(&self) -> crate::run::TriggerSource {
        match self {
            Self::Event { .. } => crate::run::TriggerSource::Event,
            Self::Webhook { .. } => crate::run::TriggerSource::Webhook,
            Self::Schedule { .. } => crate::run::TriggerSource::Schedule,
        }
    }
}

/// HTTP method for outbound webhook actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// One unit of work in a rule's action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Dispatch to a named internal action with validated parameters.
    InternalAction {
        /// Registry name of the internal action.
        action: String,
        /// Parameters passed to the action.
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Deliver a signed payload to an external HTTP endpoint.
    Webhook {
        url: String,
        method: HttpMethod,
        /// MiniJinja template rendered against the trigger context.
        payload_template: String,
    },
}

/// A stored automation rule: trigger condition plus ordered action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Unique identifier (UUID-v4, assigned on creation).
    pub id: RuleId,
    /// Tenant that owns this rule.
    pub tenant_id: TenantId,
    /// Ownership scope within the tenant.
    pub scope: RuleScope,
    /// Human-readable name.
    pub name: String,
    /// Trigger condition.
    pub trigger: TriggerConfig,
    /// Ordered action list executed on each run.
    pub actions: Vec<ActionSpec>,
    /// Disabled rules reject new triggers but retain run history.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Deleted rules never trigger again but their runs
    /// remain queryable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AutomationRule {
    /// Create a new enabled rule with a fresh id and current timestamps.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<TenantId>,
        scope: RuleScope,
        name: impl Into<String>,
        trigger: TriggerConfig,
        actions: Vec<ActionSpec>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RuleId::generate(),
            tenant_id: tenant_id.into(),
            scope,
            name: name.into(),
            trigger,
            actions,
            enabled: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the rule may produce new runs.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.deleted_at.is_none()
    }

    /// The webhook path, when this is a webhook-triggered rule.
    #[must_use]
    pub fn webhook_path(&self) -> Option<&str> {
        match &self.trigger {
            TriggerConfig::Webhook { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }
}
