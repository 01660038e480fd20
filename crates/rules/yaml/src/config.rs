//! The decoded rule-config structure.
//!
//! Rule configs are commonly authored as YAML, but the parser's contract is
//! on this decoded structure -- JSON bodies decode to the same types.

use serde::Deserialize;

use crate::error::ValidationError;

/// Top-level rule configuration as authored by a tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Human-readable rule name.
    pub name: String,
    /// Trigger block. Mandatory for every rule; its absence is a validation
    /// error, not a decode error, so the message can name the field.
    #[serde(default)]
    pub trigger: Option<TriggerSection>,
    /// Natural-language instruction. Required for agent-owned rules, compiled
    /// to a `run_task` internal action.
    #[serde(default)]
    pub task: Option<String>,
    /// Explicit action list. Required for studio- and tenant-owned rules.
    #[serde(default)]
    pub actions: Vec<ActionSection>,
    /// Whether the rule starts enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Trigger block of a rule config.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TriggerSection {
    Event {
        event_type: String,
        /// `self` restricts the match to events that explicitly mention the
        /// rule's owning agent.
        #[serde(default)]
        mention_filter: Option<String>,
    },
    Webhook {
        /// Exact addresses and/or CIDR ranges. Empty or absent = allow all.
        #[serde(default)]
        allowed_ips: Vec<String>,
    },
    Schedule {
        cron: String,
        timezone: String,
    },
}

/// One entry in the config's action list.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ActionSection {
    InternalAction {
        action: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    Webhook {
        url: String,
        method: String,
        payload_template: String,
    },
}

impl RuleConfig {
    /// Decode a config from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ValidationError> {
        serde_yaml_ng::from_str(content)
            .map_err(|e| ValidationError::Decode(format!("YAML parse error: {e}")))
    }

    /// Decode a config from an already-parsed JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value)
            .map_err(|e| ValidationError::Decode(format!("config decode error: {e}")))
    }
}
