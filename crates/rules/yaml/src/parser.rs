//! Compile a decoded [`RuleConfig`] into a validated [`AutomationRule`].

use chrono::Utc;

use reflex_core::{
    ActionSpec, AutomationRule, HttpMethod, IpAllowlist, MentionFilter, RuleScope, TenantId,
    TriggerConfig, WebhookSecret, validate_cron_expr, validate_timezone,
};

use crate::config::{ActionSection, RuleConfig, TriggerSection};
use crate::error::ValidationError;

/// Who is creating the rule; determines which action requirement applies.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub tenant_id: TenantId,
    pub scope: RuleScope,
}

/// Validate a config and build a new rule.
///
/// Webhook-triggered rules get a fresh path and secret here -- creation is
/// the only place credentials are generated.
pub fn parse_rule(config: &RuleConfig, ctx: &ParseContext) -> Result<AutomationRule, ValidationError> {
    let trigger_section = config.trigger.as_ref().ok_or_else(|| ValidationError::missing("trigger"))?;
    let trigger = compile_trigger(trigger_section, None)?;
    let actions = compile_actions(config, &ctx.scope)?;

    Ok(AutomationRule {
        enabled: config.enabled,
        ..AutomationRule::new(
            ctx.tenant_id.clone(),
            ctx.scope.clone(),
            config.name.clone(),
            trigger,
            actions,
        )
    })
}

/// Re-validate a config against an existing rule and produce the updated
/// record.
///
/// Identity, creation time, and scope are preserved. Webhook credentials are
/// never rotated by an update: if both the old and new trigger are webhooks,
/// the stored path and secret carry over (rotation is a separate explicit
/// operation). A schedule trigger keeps its `last_fired_at` bookkeeping when
/// the trigger stays a schedule.
pub fn parse_update(
    config: &RuleConfig,
    existing: &AutomationRule,
) -> Result<AutomationRule, ValidationError> {
    let trigger_section = config.trigger.as_ref().ok_or_else(|| ValidationError::missing("trigger"))?;
    let trigger = compile_trigger(trigger_section, Some(&existing.trigger))?;
    let actions = compile_actions(config, &existing.scope)?;

    let mut updated = existing.clone();
    updated.name.clone_from(&config.name);
    updated.trigger = trigger;
    updated.actions = actions;
    updated.enabled = config.enabled;
    updated.updated_at = Utc::now();
    Ok(updated)
}

fn compile_trigger(
    section: &TriggerSection,
    existing: Option<&TriggerConfig>,
) -> Result<TriggerConfig, ValidationError> {
    match section {
        TriggerSection::Event {
            event_type,
            mention_filter,
        } => {
            if event_type.trim().is_empty() {
                return Err(ValidationError::missing("event_type"));
            }
            let mention_filter = match mention_filter.as_deref() {
                None => None,
                Some("self") => Some(MentionFilter::SelfMention),
                Some(other) => {
                    return Err(ValidationError::invalid(
                        "mention_filter",
                        format!("expected \"self\", got \"{other}\""),
                    ));
                }
            };
            Ok(TriggerConfig::Event {
                event_type: event_type.clone(),
                mention_filter,
            })
        }
        TriggerSection::Webhook { allowed_ips } => {
            let allowed_ips = IpAllowlist::parse(allowed_ips)
                .map_err(|e| ValidationError::invalid("allowed_ips", e.to_string()))?;
            // Keep existing credentials on update; generate only at creation.
            let (path, secret) = match existing {
                Some(TriggerConfig::Webhook { path, secret, .. }) => {
                    (path.clone(), secret.clone())
                }
                _ => (
                    reflex_crypto::generate_path(),
                    WebhookSecret::new(reflex_crypto::generate_secret()),
                ),
            };
            Ok(TriggerConfig::Webhook {
                path,
                secret,
                allowed_ips,
            })
        }
        TriggerSection::Schedule { cron, timezone } => {
            validate_cron_expr(cron).map_err(|e| ValidationError::invalid("cron", e.to_string()))?;
            validate_timezone(timezone)
                .map_err(|e| ValidationError::invalid("timezone", e.to_string()))?;
            let last_fired_at = match existing {
                Some(TriggerConfig::Schedule { last_fired_at, .. }) => *last_fired_at,
                _ => None,
            };
            Ok(TriggerConfig::Schedule {
                cron: cron.clone(),
                timezone: timezone.clone(),
                last_fired_at,
            })
        }
    }
}

/// Apply the scope-specific action requirement and compile the action list.
///
/// Agent-owned rules require a `task`, which compiles to a leading `run_task`
/// internal action (explicit actions, if any, follow it). Studio- and
/// tenant-owned rules require a non-empty `actions` list.
fn compile_actions(
    config: &RuleConfig,
    scope: &RuleScope,
) -> Result<Vec<ActionSpec>, ValidationError> {
    let mut actions = Vec::new();
    match scope {
        RuleScope::Agent { .. } => {
            let task = config
                .task
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ValidationError::missing("task"))?;
            actions.push(ActionSpec::InternalAction {
                action: "run_task".into(),
                params: serde_json::json!({ "instruction": task }),
            });
        }
        RuleScope::Studio { .. } | RuleScope::Tenant => {
            if config.actions.is_empty() {
                return Err(ValidationError::missing("actions"));
            }
        }
    }
    for section in &config.actions {
        actions.push(compile_action(section)?);
    }
    Ok(actions)
}

fn compile_action(section: &ActionSection) -> Result<ActionSpec, ValidationError> {
    match section {
        ActionSection::InternalAction { action, params } => {
            if action.trim().is_empty() {
                return Err(ValidationError::missing("action"));
            }
            Ok(ActionSpec::InternalAction {
                action: action.clone(),
                params: params.clone(),
            })
        }
        ActionSection::Webhook {
            url,
            method,
            payload_template,
        } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ValidationError::invalid(
                    "url",
                    format!("expected an http(s) URL, got \"{url}\""),
                ));
            }
            let method = parse_method(method)?;
            Ok(ActionSpec::Webhook {
                url: url.clone(),
                method,
                payload_template: payload_template.clone(),
            })
        }
    }
}

fn parse_method(method: &str) -> Result<HttpMethod, ValidationError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(HttpMethod::Get),
        "POST" => Ok(HttpMethod::Post),
        "PUT" => Ok(HttpMethod::Put),
        "PATCH" => Ok(HttpMethod::Patch),
        "DELETE" => Ok(HttpMethod::Delete),
        other => Err(ValidationError::invalid(
            "method",
            format!("unsupported HTTP method \"{other}\""),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reflex_core::AgentId;

    fn tenant_ctx() -> ParseContext {
        ParseContext {
            tenant_id: TenantId::new("t1"),
            scope: RuleScope::Tenant,
        }
    }

    fn agent_ctx() -> ParseContext {
        ParseContext {
            tenant_id: TenantId::new("t1"),
            scope: RuleScope::Agent {
                agent_id: AgentId::new("a1"),
            },
        }
    }

    fn studio_ctx() -> ParseContext {
        ParseContext {
            tenant_id: TenantId::new("t1"),
            scope: RuleScope::Studio {
                studio_id: "s1".into(),
            },
        }
    }

    #[test]
    fn missing_trigger_names_the_field() {
        let config = RuleConfig::from_yaml("name: x\ntask: y\n").unwrap();
        let err = parse_rule(&config, &agent_ctx()).unwrap_err();
        assert_eq!(err.to_string(), "trigger is required");
    }

    #[test]
    fn agent_rule_requires_task() {
        let config = RuleConfig::from_yaml(
            "name: x\ntrigger:\n  type: event\n  event_type: message.created\n",
        )
        .unwrap();
        let err = parse_rule(&config, &agent_ctx()).unwrap_err();
        assert_eq!(err.to_string(), "task is required");
    }

    #[test]
    fn agent_task_compiles_to_run_task_action() {
        let config = RuleConfig::from_yaml(
            "name: x\ntrigger:\n  type: event\n  event_type: message.created\ntask: summarize it\n",
        )
        .unwrap();
        let rule = parse_rule(&config, &agent_ctx()).unwrap();
        assert_eq!(rule.actions.len(), 1);
        assert!(matches!(
            &rule.actions[0],
            ActionSpec::InternalAction { action, params }
                if action == "run_task" && params["instruction"] == "summarize it"
        ));
    }

    #[test]
    fn studio_rule_requires_actions() {
        let config = RuleConfig::from_yaml(
            "name: x\ntrigger:\n  type: event\n  event_type: message.created\n",
        )
        .unwrap();
        let err = parse_rule(&config, &studio_ctx()).unwrap_err();
        assert_eq!(err.to_string(), "actions is required");
    }

    #[test]
    fn webhook_trigger_generates_credentials_at_creation() {
        let config = RuleConfig::from_yaml(
            r"
name: hook
trigger:
  type: webhook
actions:
  - type: internal_action
    action: noop
",
        )
        .unwrap();
        let a = parse_rule(&config, &tenant_ctx()).unwrap();
        let b = parse_rule(&config, &tenant_ctx()).unwrap();
        let (path_a, path_b) = (a.webhook_path().unwrap(), b.webhook_path().unwrap());
        assert!(path_a.starts_with("hk_"));
        assert_ne!(path_a, path_b, "paths must be unique per creation");
    }

    #[test]
    fn update_preserves_webhook_credentials() {
        let config = RuleConfig::from_yaml(
            r"
name: hook
trigger:
  type: webhook
actions:
  - type: internal_action
    action: noop
",
        )
        .unwrap();
        let original = parse_rule(&config, &tenant_ctx()).unwrap();

        let updated_config = RuleConfig::from_yaml(
            r#"
name: hook v2
trigger:
  type: webhook
  allowed_ips: ["10.0.0.0/8"]
actions:
  - type: internal_action
    action: noop
"#,
        )
        .unwrap();
        let updated = parse_update(&updated_config, &original).unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.webhook_path(), original.webhook_path());
        assert_eq!(updated.name, "hook v2");
        let (
            TriggerConfig::Webhook { secret: old, .. },
            TriggerConfig::Webhook {
                secret: new,
                allowed_ips,
                ..
            },
        ) = (&original.trigger, &updated.trigger)
        else {
            panic!("expected webhook triggers");
        };
        assert_eq!(old, new);
        assert!(!allowed_ips.is_empty());
    }

    #[test]
    fn schedule_trigger_validates_cron_and_timezone() {
        let bad_cron = RuleConfig::from_json(serde_json::json!({
            "name": "x",
            "trigger": {"type": "schedule", "cron": "not a cron", "timezone": "UTC"},
            "actions": [{"type": "internal_action", "action": "noop"}],
        }))
        .unwrap();
        let err = parse_rule(&bad_cron, &tenant_ctx()).unwrap_err();
        assert!(err.to_string().starts_with("invalid cron"));

        let bad_tz = RuleConfig::from_json(serde_json::json!({
            "name": "x",
            "trigger": {"type": "schedule", "cron": "* * * * *", "timezone": "Mars/Olympus"},
            "actions": [{"type": "internal_action", "action": "noop"}],
        }))
        .unwrap();
        let err = parse_rule(&bad_tz, &tenant_ctx()).unwrap_err();
        assert!(err.to_string().starts_with("invalid timezone"));
    }

    #[test]
    fn update_preserves_schedule_bookkeeping() {
        let config = RuleConfig::from_json(serde_json::json!({
            "name": "cron",
            "trigger": {"type": "schedule", "cron": "* * * * *", "timezone": "UTC"},
            "actions": [{"type": "internal_action", "action": "noop"}],
        }))
        .unwrap();
        let mut original = parse_rule(&config, &tenant_ctx()).unwrap();
        let fired = Utc::now();
        if let TriggerConfig::Schedule {
            ref mut last_fired_at,
            ..
        } = original.trigger
        {
            *last_fired_at = Some(fired);
        }

        let updated = parse_update(&config, &original).unwrap();
        let TriggerConfig::Schedule { last_fired_at, .. } = updated.trigger else {
            panic!("expected schedule trigger");
        };
        assert_eq!(last_fired_at, Some(fired));
    }

    #[test]
    fn update_stamps_updated_at_and_keeps_created_at() {
        let config = RuleConfig::from_json(serde_json::json!({
            "name": "x",
            "trigger": {"type": "event", "event_type": "m"},
            "actions": [{"type": "internal_action", "action": "noop"}],
        }))
        .unwrap();
        let original = parse_rule(&config, &tenant_ctx()).unwrap();
        let updated = parse_update(&config, &original).unwrap();
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at >= original.updated_at);
    }

    #[test]
    fn invalid_mention_filter_is_rejected() {
        let config = RuleConfig::from_json(serde_json::json!({
            "name": "x",
            "trigger": {"type": "event", "event_type": "m", "mention_filter": "everyone"},
            "task": "do it",
        }))
        .unwrap();
        let err = parse_rule(&config, &agent_ctx()).unwrap_err();
        assert!(err.to_string().contains("mention_filter"));
    }

    #[test]
    fn webhook_action_requires_http_url_and_known_method() {
        let bad_url = RuleConfig::from_json(serde_json::json!({
            "name": "x",
            "trigger": {"type": "webhook"},
            "actions": [{"type": "webhook", "url": "ftp://x", "method": "POST", "payload_template": "{}"}],
        }))
        .unwrap();
        assert!(parse_rule(&bad_url, &tenant_ctx()).is_err());

        let bad_method = RuleConfig::from_json(serde_json::json!({
            "name": "x",
            "trigger": {"type": "webhook"},
            "actions": [{"type": "webhook", "url": "https://x", "method": "BREW", "payload_template": "{}"}],
        }))
        .unwrap();
        let err = parse_rule(&bad_method, &tenant_ctx()).unwrap_err();
        assert!(err.to_string().contains("BREW"));
    }

    #[test]
    fn disabled_flag_carries_over() {
        let config = RuleConfig::from_json(serde_json::json!({
            "name": "x",
            "trigger": {"type": "webhook"},
            "actions": [{"type": "internal_action", "action": "noop"}],
            "enabled": false,
        }))
        .unwrap();
        let rule = parse_rule(&config, &tenant_ctx()).unwrap();
        assert!(!rule.enabled);
    }
}
