//! Run inspection and cancellation endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use tracing::info;

use reflex_core::{RuleId, RunId};
use reflex_engine::CancelOutcome;
use reflex_state::StateError;

use crate::error::ServerError;

use super::AppState;
use super::schemas::RunResponse;

/// `GET /v1/rules/{id}/runs` -- a rule's runs, newest first.
pub async fn list_rule_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    // 404 for unknown rules rather than an empty list.
    if state.rules.get_rule(&RuleId::new(&*id)).await?.is_none() {
        return Err(StateError::NotFound(id).into());
    }
    let runs = state.engine.ledger().list_for_rule(&RuleId::new(id)).await?;
    let body: Vec<RunResponse> = runs.iter().map(RunResponse::from).collect();
    Ok(Json(body))
}

/// `GET /v1/runs/{id}`.
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let run = state
        .engine
        .ledger()
        .get(&RunId::new(&*id))
        .await?
        .ok_or(StateError::NotFound(id))?;
    Ok(Json(RunResponse::from(&run)))
}

/// `POST /v1/runs/{id}/cancel` -- request cooperative cancellation.
///
/// Pending runs never start; running runs stop before their next action. On
/// a run that already finished this is a no-op reporting the current status.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let run_id = RunId::new(&*id);
    let outcome = state.engine.ledger().cancel(&run_id).await?;
    let status = match outcome {
        CancelOutcome::Cancelled(status) => {
            info!(run_id = %run_id, "run cancelled");
            status
        }
        CancelOutcome::AlreadyFinished(status) => status,
    };
    Ok(Json(serde_json::json!({ "status": status })))
}
