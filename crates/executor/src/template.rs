//! Payload template rendering for outbound webhook actions.
//!
//! Templates are `MiniJinja` (Jinja2-compatible) strings rendered against the
//! run's [`ActionContext`](crate::context::ActionContext) variables. Fuel and
//! output-size limits bound what a tenant-authored template can do.

use crate::collaborators::ActionError;

/// Maximum rendered payload size (1 MB).
const MAX_RENDERED_BYTES: usize = 1_024 * 1_024;

/// Fuel limit for template evaluation (denial-of-service protection).
const FUEL_LIMIT: u64 = 100_000;

/// Render a payload template against the given variables.
pub fn render_payload(template: &str, vars: &serde_json::Value) -> Result<String, ActionError> {
    let mut env = minijinja::Environment::new();
    env.set_fuel(Some(FUEL_LIMIT));

    let ctx = minijinja::Value::from_serialize(vars);
    let rendered = env
        .render_str(template, &ctx)
        .map_err(|e| ActionError::Failed(format!("payload template error: {e}")))?;

    if rendered.len() > MAX_RENDERED_BYTES {
        return Err(ActionError::Failed(format!(
            "rendered payload exceeds maximum size of {MAX_RENDERED_BYTES} bytes"
        )));
    }
    Ok(rendered)
}
