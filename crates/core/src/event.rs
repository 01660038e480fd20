use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentId, EventId, TenantId};

/// A domain event consumed by the trigger matcher.
///
/// Tenant id is a mandatory equality filter during matching and is never
/// inferred from event content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique identifier (UUID-v4, assigned on creation).
    pub id: EventId,
    /// Tenant the event occurred in.
    pub tenant_id: TenantId,
    /// Event type discriminator (e.g. `message.created`).
    pub event_type: String,
    /// Who caused the event (user id, agent id, system).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Agents explicitly mentioned/addressed by the event, as opposed to
    /// merely participating. Drives [`MentionFilter`](crate::MentionFilter).
    #[serde(default)]
    pub mentions: Vec<AgentId>,
    /// Arbitrary event metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Create a new event with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(tenant_id: impl Into<TenantId>, event_type: impl Into<String>) -> Self {
        Self {
            id: EventId::generate(),
            tenant_id: tenant_id.into(),
            event_type: event_type.into(),
            actor: None,
            mentions: Vec::new(),
            metadata: HashMap::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Add an explicitly mentioned agent.
    #[must_use]
    pub fn with_mention(mut self, agent: impl Into<AgentId>) -> Self {
        self.mentions.push(agent.into());
        self
    }

    /// Set the actor.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Whether the given agent is explicitly mentioned.
    #[must_use]
    pub fn mentions_agent(&self, agent: &AgentId) -> bool {
        self.mentions.contains(agent)
    }
}
