//! Persistence traits for the Reflex rule engine.
//!
//! [`RuleStore`] holds automation rule configuration; [`RunStore`] owns run
//! records and guards their state machine. Backends implement both; the
//! in-memory backend lives in `reflex-state-memory`.

pub mod error;
pub mod store;

pub use error::StateError;
pub use store::{ClaimResult, RuleStore, RunStore};
