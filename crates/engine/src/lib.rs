//! Orchestration layer for Reflex: webhook authentication, event matching,
//! schedule dispatch, and the run pipeline.
//!
//! All three trigger paths converge on the same bounded [`RunQueue`] drained
//! by the [`RunWorker`]; the [`Engine`] facade is what the HTTP layer talks
//! to.

pub mod authenticator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod matcher;
pub mod worker;

pub use authenticator::{AuthError, AuthenticateError, InboundWebhook, WebhookAuthenticator};
pub use dispatcher::ScheduleDispatcher;
pub use engine::{Engine, EngineBuilder, EngineRuntime};
pub use error::EngineError;
pub use ledger::{CancelOutcome, RunLedger};
pub use matcher::TriggerMatcher;
pub use worker::{QueuedRun, RunQueue, RunWorker};
