//! Core domain types for the Reflex automation rule engine.
//!
//! An [`AutomationRule`] binds a trigger condition (domain event, signed
//! inbound webhook, or cron schedule) to an ordered list of [`ActionSpec`]s.
//! Each firing produces a [`RuleRun`] tracked through the [`RunStatus`] state
//! machine.

pub mod allowlist;
pub mod cron;
pub mod event;
pub mod rule;
pub mod run;
pub mod types;

pub use allowlist::{AllowlistError, IpAllowlist, IpEntry};
pub use cron::{CronError, next_occurrence, validate_cron_expr, validate_timezone};
pub use event::DomainEvent;
pub use rule::{
    ActionSpec, AutomationRule, HttpMethod, MentionFilter, RuleScope, TriggerConfig, WebhookSecret,
};
pub use run::{RuleRun, RunStatus, TriggerSnapshot, TriggerSource};
pub use types::{AgentId, EventId, RuleId, RunId, StudioId, TenantId};
