//! Request and response bodies for the management API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reflex_core::{
    ActionSpec, AutomationRule, IpAllowlist, MentionFilter, RuleRun, RuleScope, TriggerConfig,
};

/// Body for `POST /v1/rules`.
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    /// Tenant the rule belongs to.
    pub tenant_id: String,
    /// Ownership scope within the tenant.
    pub scope: RuleScope,
    /// The rule config document, in the same shape the YAML frontend accepts.
    pub rule: serde_json::Value,
}

/// Body for `POST /v1/events`.
#[derive(Debug, Deserialize)]
pub struct InjectEventRequest {
    pub tenant_id: String,
    pub event_type: String,
    #[serde(default)]
    pub actor: Option<String>,
    /// Agent ids explicitly addressed by the event.
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

/// Trigger as shown in API responses. The webhook secret never appears here;
/// it is returned exactly once, at creation or rotation.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerView {
    Event {
        event_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mention_filter: Option<MentionFilter>,
    },
    Webhook {
        path: String,
        allowed_ips: IpAllowlist,
    },
    Schedule {
        cron: String,
        timezone: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_fired_at: Option<DateTime<Utc>>,
    },
}

impl From<&TriggerConfig> for TriggerView {
    fn from(trigger: &TriggerConfig) -> Self {
        match trigger {
            TriggerConfig::Event {
                event_type,
                mention_filter,
            } => Self::Event {
                event_type: event_type.clone(),
                mention_filter: *mention_filter,
            },
            TriggerConfig::Webhook {
                path, allowed_ips, ..
            } => Self::Webhook {
                path: path.clone(),
                allowed_ips: allowed_ips.clone(),
            },
            TriggerConfig::Schedule {
                cron,
                timezone,
                last_fired_at,
            } => Self::Schedule {
                cron: cron.clone(),
                timezone: timezone.clone(),
                last_fired_at: *last_fired_at,
            },
        }
    }
}

/// A rule as returned by the management API.
#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub id: String,
    pub tenant_id: String,
    pub scope: RuleScope,
    pub name: String,
    pub trigger: TriggerView,
    pub actions: Vec<ActionSpec>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&AutomationRule> for RuleResponse {
    fn from(rule: &AutomationRule) -> Self {
        Self {
            id: rule.id.as_str().to_owned(),
            tenant_id: rule.tenant_id.as_str().to_owned(),
            scope: rule.scope.clone(),
            name: rule.name.clone(),
            trigger: TriggerView::from(&rule.trigger),
            actions: rule.actions.clone(),
            enabled: rule.enabled,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
            deleted_at: rule.deleted_at,
        }
    }
}

/// Webhook credentials, present only in create and rotate responses.
#[derive(Debug, Serialize)]
pub struct WebhookCredentials {
    pub path: String,
    pub secret: String,
}

/// Response from `POST /v1/rules` and `POST /v1/rules/{id}/rotate`.
#[derive(Debug, Serialize)]
pub struct RuleWithCredentials {
    #[serde(flatten)]
    pub rule: RuleResponse,
    /// Present only for webhook-triggered rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<WebhookCredentials>,
}

impl RuleWithCredentials {
    /// Build the one response that is allowed to carry the secret.
    pub fn revealing(rule: &AutomationRule) -> Self {
        let credentials = match &rule.trigger {
            TriggerConfig::Webhook { path, secret, .. } => Some(WebhookCredentials {
                path: path.clone(),
                secret: secret.expose().to_owned(),
            }),
            _ => None,
        };
        Self {
            rule: RuleResponse::from(rule),
            credentials,
        }
    }
}

/// A run as returned by the management API.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: String,
    pub rule_id: String,
    pub trigger_source: reflex_core::TriggerSource,
    pub status: reflex_core::RunStatus,
    pub trigger_snapshot: reflex_core::TriggerSnapshot,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RuleRun> for RunResponse {
    fn from(run: &RuleRun) -> Self {
        Self {
            id: run.id.as_str().to_owned(),
            rule_id: run.rule_id.as_str().to_owned(),
            trigger_source: run.trigger_source,
            status: run.status,
            trigger_snapshot: run.trigger_snapshot.clone(),
            created_at: run.created_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            error: run.error.clone(),
        }
    }
}

/// Response for an accepted inbound webhook.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub run_id: String,
}
