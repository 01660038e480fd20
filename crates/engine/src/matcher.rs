//! Event-to-rule matching.

use std::sync::Arc;

use tracing::instrument;

use reflex_core::{AutomationRule, DomainEvent, MentionFilter, TriggerConfig};
use reflex_state::{RuleStore, StateError};

/// Finds enabled event-triggered rules matching a domain event.
///
/// Stateless over the rule store; safe on arbitrary request-handling threads.
pub struct TriggerMatcher {
    rules: Arc<dyn RuleStore>,
}

impl TriggerMatcher {
    #[must_use]
    pub fn new(rules: Arc<dyn RuleStore>) -> Self {
        Self { rules }
    }

    /// All rules that should fire for this event.
    ///
    /// Tenant id and event type are mandatory equality filters (the store
    /// applies them); the mention filter is applied here. Matches are
    /// independent -- no rule suppresses another.
    #[instrument(skip(self, event), fields(tenant = %event.tenant_id, event_type = %event.event_type))]
    pub async fn matching_rules(
        &self,
        event: &DomainEvent,
    ) -> Result<Vec<AutomationRule>, StateError> {
        let candidates = self
            .rules
            .list_event_rules(&event.tenant_id, &event.event_type)
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|rule| Self::mention_filter_passes(rule, event))
            .collect())
    }

    fn mention_filter_passes(rule: &AutomationRule, event: &DomainEvent) -> bool {
        let TriggerConfig::Event { mention_filter, .. } = &rule.trigger else {
            return false;
        };
        match mention_filter {
            None => true,
            Some(MentionFilter::SelfMention) => {
                // Only meaningful for agent-owned rules: the owning agent must
                // be explicitly addressed, not merely a participant.
                rule.scope
                    .agent_id()
                    .is_some_and(|agent| event.mentions_agent(agent))
            }
        }
    }
}
