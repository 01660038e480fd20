use serde::Serialize;

use reflex_core::{RuleId, RunId, TenantId, TriggerSnapshot, TriggerSource};

/// Everything an action may reference about the run it executes in.
///
/// Built once per run from the stored [`TriggerSnapshot`] -- never recomputed
/// from the live rule config, which may have drifted since the trigger fired.
#[derive(Debug, Clone, Serialize)]
pub struct ActionContext {
    pub tenant_id: TenantId,
    pub rule_id: RuleId,
    pub run_id: RunId,
    pub trigger_source: TriggerSource,
    /// Snapshot captured at trigger time (payload, source IP, event id).
    pub trigger: TriggerSnapshot,
    /// Secret used to sign outbound webhook payloads for this run: the
    /// rule's own webhook secret when it has one, otherwise the engine's
    /// deployment-wide outbound signing secret.
    #[serde(skip)]
    pub signing_secret: String,
}

impl ActionContext {
    /// The template variables exposed to payload templates.
    ///
    /// Flattens the snapshot so templates can write `{{ payload }}`,
    /// `{{ source_ip }}`, `{{ event_id }}` alongside the identifiers.
    #[must_use]
    pub fn template_vars(&self) -> serde_json::Value {
        serde_json::json!({
            "tenant_id": self.tenant_id,
            "rule_id": self.rule_id,
            "run_id": self.run_id,
            "trigger_source": self.trigger_source,
            "payload": self.trigger.payload,
            "source_ip": self.trigger.source_ip,
            "event_id": self.trigger.event_id,
        })
    }
}
