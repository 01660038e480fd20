//! Rule-config parsing and validation.
//!
//! Decodes structured rule configs (YAML documents or JSON bodies) into the
//! [`RuleConfig`] shape and compiles them into validated
//! [`AutomationRule`](reflex_core::AutomationRule)s, enforcing the
//! scope-specific requirements (agent rules need a `task`, studio and tenant
//! rules need `actions`) and generating webhook credentials at creation only.

pub mod config;
pub mod error;
pub mod parser;

pub use config::{ActionSection, RuleConfig, TriggerSection};
pub use error::ValidationError;
pub use parser::{ParseContext, parse_rule, parse_update};
