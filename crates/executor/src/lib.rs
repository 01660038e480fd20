//! Action execution for Reflex runs.
//!
//! The [`ActionExecutor`] walks a run's action list strictly in declared
//! order, dispatching internal actions to the
//! [`InternalActionRegistry`] collaborator and delivering rendered, signed
//! payloads through the [`WebhookSender`] collaborator. One failing action
//! aborts the rest of its run; runs are each other's isolation boundary.

pub mod collaborators;
pub mod context;
pub mod executor;
pub mod retry;
pub mod template;

pub use collaborators::{
    ActionError, HttpWebhookSender, InternalActionRegistry, SIGNATURE_HEADER, SignedDelivery,
    TIMESTAMP_HEADER, WebhookSender,
};
pub use context::ActionContext;
pub use executor::{ActionExecutor, CancellationProbe, ExecutionOutcome, NeverCancelled};
pub use retry::RetryStrategy;
