//! Rule management endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use reflex_core::{RuleId, TenantId, TriggerConfig, WebhookSecret};
use reflex_rules_yaml::{ParseContext, RuleConfig, ValidationError, parse_rule, parse_update};
use reflex_state::StateError;

use crate::error::ServerError;

use super::AppState;
use super::schemas::{CreateRuleRequest, RuleResponse, RuleWithCredentials};

/// `POST /v1/rules` -- validate a config and create a rule.
///
/// The only response that ever carries a webhook secret (besides rotation).
pub async fn create_rule(
    State(state): State<AppState>,
    Json(request): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let config = RuleConfig::from_json(request.rule)?;
    let ctx = ParseContext {
        tenant_id: TenantId::new(request.tenant_id),
        scope: request.scope,
    };
    let rule = parse_rule(&config, &ctx)?;
    state.rules.insert_rule(rule.clone()).await?;
    info!(rule_id = %rule.id, tenant = %rule.tenant_id, "rule created");
    Ok((
        StatusCode::CREATED,
        Json(RuleWithCredentials::revealing(&rule)),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListRulesQuery {
    pub tenant_id: String,
}

/// `GET /v1/rules?tenant_id=...` -- list a tenant's rules (newest unspecified
/// order; soft-deleted rules excluded).
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<ListRulesQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let rules = state
        .rules
        .list_rules(&TenantId::new(query.tenant_id))
        .await?;
    let body: Vec<RuleResponse> = rules.iter().map(RuleResponse::from).collect();
    Ok(Json(body))
}

/// `GET /v1/rules/{id}`.
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let rule = load(&state, &id).await?;
    Ok(Json(RuleResponse::from(&rule)))
}

/// `PUT /v1/rules/{id}` -- re-validate a config against the existing rule.
///
/// Identity, scope, and webhook credentials are preserved; this never
/// rotates.
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(config): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ServerError> {
    let existing = load(&state, &id).await?;
    let config = RuleConfig::from_json(config)?;
    let updated = parse_update(&config, &existing)?;
    state.rules.update_rule(updated.clone()).await?;
    info!(rule_id = %updated.id, "rule updated");
    Ok(Json(RuleResponse::from(&updated)))
}

/// `DELETE /v1/rules/{id}` -- soft delete. The rule never triggers again but
/// stays queryable and its runs remain resolvable.
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let rule = load(&state, &id).await?;
    state.rules.soft_delete_rule(&rule.id, Utc::now()).await?;
    info!(rule_id = %rule.id, "rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/rules/{id}/enable`.
pub async fn enable_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    set_enabled(&state, &id, true).await
}

/// `POST /v1/rules/{id}/disable`.
pub async fn disable_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    set_enabled(&state, &id, false).await
}

/// `POST /v1/rules/{id}/rotate` -- generate a fresh webhook secret.
///
/// The path stays stable so callers keep their URL; only the secret changes,
/// and it is returned exactly once in this response. In-flight requests
/// signed with the old secret fail verification from here on.
pub async fn rotate_credentials(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let mut rule = load(&state, &id).await?;
    let TriggerConfig::Webhook { ref mut secret, .. } = rule.trigger else {
        return Err(ValidationError::InvalidField {
            field: "trigger",
            message: "rotation applies only to webhook-triggered rules".to_owned(),
        }
        .into());
    };
    *secret = WebhookSecret::new(reflex_crypto::generate_secret());
    rule.updated_at = Utc::now();
    state.rules.update_rule(rule.clone()).await?;
    info!(rule_id = %rule.id, "webhook secret rotated");
    Ok(Json(RuleWithCredentials::revealing(&rule)))
}

async fn set_enabled(
    state: &AppState,
    id: &str,
    enabled: bool,
) -> Result<Json<RuleResponse>, ServerError> {
    let mut rule = load(state, id).await?;
    rule.enabled = enabled;
    rule.updated_at = Utc::now();
    state.rules.update_rule(rule.clone()).await?;
    info!(rule_id = %rule.id, enabled, "rule enabled flag changed");
    Ok(Json(RuleResponse::from(&rule)))
}

/// Fetch a rule or 404. Soft-deleted rules remain addressable so history
/// endpoints keep working; mutations on them fail downstream if relevant.
async fn load(state: &AppState, id: &str) -> Result<reflex_core::AutomationRule, ServerError> {
    state
        .rules
        .get_rule(&RuleId::new(id))
        .await?
        .ok_or_else(|| StateError::NotFound(id.to_owned()).into())
}
