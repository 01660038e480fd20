use reflex_state::StateError;

use crate::authenticator::AuthError;

/// Errors surfaced by the engine's ingestion and orchestration paths.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Inbound webhook authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A store operation failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// The run queue is closed (the worker has shut down).
    #[error("run queue closed")]
    QueueClosed,
}
