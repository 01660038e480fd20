use reflex_core::RunStatus;

/// Errors surfaced by rule and run stores.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateError {
    /// The addressed rule or run does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A webhook path is already in use by another rule. Paths are the sole
    /// public routing key and must be unique across all tenants.
    #[error("webhook path already in use: {0}")]
    DuplicateWebhookPath(String),

    /// A run status transition violates the state machine.
    #[error("illegal run transition: {from} -> {to}")]
    IllegalTransition { from: RunStatus, to: RunStatus },

    /// Backend-specific failure (connection, serialization, ...).
    #[error("state backend error: {0}")]
    Backend(String),
}
