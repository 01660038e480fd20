//! Built-in internal actions for single-node deployments.

use async_trait::async_trait;
use tracing::info;

use reflex_executor::{ActionContext, ActionError, InternalActionRegistry};

/// Registry of the actions the standalone server ships with.
///
/// `run_task` hands an instruction to the owning agent and `log` emits its
/// params at info level. Anything else is rejected by name, which fails the
/// run at that action.
pub struct BuiltinActionRegistry;

#[async_trait]
impl InternalActionRegistry for BuiltinActionRegistry {
    async fn execute(
        &self,
        name: &str,
        params: &serde_json::Value,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError> {
        match name {
            "run_task" => {
                let instruction = params
                    .get("instruction")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| ActionError::InvalidParams {
                        action: name.to_owned(),
                        message: "instruction must be a string".to_owned(),
                    })?;
                info!(
                    tenant = %ctx.tenant_id,
                    rule = %ctx.rule_id,
                    run = %ctx.run_id,
                    instruction,
                    "task dispatched"
                );
                Ok(serde_json::json!({ "dispatched": true }))
            }
            "log" => {
                info!(
                    tenant = %ctx.tenant_id,
                    rule = %ctx.rule_id,
                    run = %ctx.run_id,
                    params = %params,
                    "log action"
                );
                Ok(serde_json::Value::Null)
            }
            other => Err(ActionError::UnknownAction(other.to_owned())),
        }
    }
}
