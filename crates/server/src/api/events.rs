//! Domain-event injection (`POST /v1/events`).

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use reflex_core::DomainEvent;

use crate::error::ServerError;

use super::AppState;
use super::schemas::{InjectEventRequest, RunResponse};

/// Inject a domain event and fan it out to matching rules.
///
/// Returns 202 with the created runs; an event matching nothing is a valid
/// request with an empty list.
pub async fn inject_event(
    State(state): State<AppState>,
    Json(request): Json<InjectEventRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let mut event = DomainEvent::new(request.tenant_id, request.event_type);
    event.actor = request.actor;
    event.mentions = request.mentions.into_iter().map(Into::into).collect();
    event.metadata = request.metadata;

    let runs = state.engine.ingest_event(&event).await?;
    info!(
        event_id = %event.id,
        tenant = %event.tenant_id,
        matched = runs.len(),
        "event ingested"
    );
    let body: Vec<RunResponse> = runs.iter().map(RunResponse::from).collect();
    Ok((StatusCode::ACCEPTED, Json(body)))
}
