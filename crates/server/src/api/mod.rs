//! HTTP surface: webhook ingestion plus the rule/run management API.

pub mod events;
pub mod health;
pub mod hooks;
pub mod rules;
pub mod runs;
pub mod schemas;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use reflex_core::IpAllowlist;
use reflex_engine::Engine;
use reflex_state::RuleStore;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion front door (webhooks, events) and run bookkeeping.
    pub engine: Arc<Engine>,
    /// Rule store, used directly by the management API.
    pub rules: Arc<dyn RuleStore>,
    /// Peers whose `X-Forwarded-For` header is honored. Empty = trust none.
    pub trusted_proxies: IpAllowlist,
}

/// Build the axum router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/hooks/{path}", post(hooks::ingest))
        .route("/v1/rules", get(rules::list_rules).post(rules::create_rule))
        .route(
            "/v1/rules/{id}",
            get(rules::get_rule)
                .put(rules::update_rule)
                .delete(rules::delete_rule),
        )
        .route("/v1/rules/{id}/enable", post(rules::enable_rule))
        .route("/v1/rules/{id}/disable", post(rules::disable_rule))
        .route("/v1/rules/{id}/rotate", post(rules::rotate_credentials))
        .route("/v1/rules/{id}/runs", get(runs::list_rule_runs))
        .route("/v1/runs/{id}", get(runs::get_run))
        .route("/v1/runs/{id}/cancel", post(runs::cancel_run))
        .route("/v1/events", post(events::inject_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
