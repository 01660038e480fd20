//! HTTP server for the Reflex automation rule engine.
//!
//! Exposes the `/hooks/{path}` ingestion endpoint and the `/v1` management
//! API over an [`reflex_engine::Engine`]; the binary wires the in-memory
//! state backend, the built-in action registry, and the `reqwest` outbound
//! sender.

pub mod actions;
pub mod api;
pub mod config;
pub mod error;
pub mod telemetry;

pub use config::ReflexConfig;
pub use error::ServerError;
