use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use reflex_engine::{AuthError, EngineError};
use reflex_rules_yaml::ValidationError;
use reflex_state::StateError;

/// Errors that can occur when running the Reflex server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound webhook was rejected.
    #[error(transparent)]
    Rejected(#[from] AuthError),

    /// A rule config failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A store operation failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// An inbound body exceeded the ingestion size cap.
    #[error("payload too large")]
    PayloadTooLarge,

    /// The run queue is closed; the service is shutting down.
    #[error("service unavailable")]
    Unavailable,
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Auth(e) => Self::Rejected(e),
            EngineError::State(e) => Self::State(e),
            EngineError::QueueClosed => Self::Unavailable,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            // Auth rejections use fixed machine-readable tokens as the error
            // value, with no further detail.
            Self::Rejected(e) => {
                let status = match e {
                    AuthError::NotFound => StatusCode::NOT_FOUND,
                    AuthError::InvalidSignature | AuthError::TimestampExpired => {
                        StatusCode::UNAUTHORIZED
                    }
                    AuthError::RuleDisabled => StatusCode::UNPROCESSABLE_ENTITY,
                    AuthError::IpNotAllowed => StatusCode::FORBIDDEN,
                };
                (status, serde_json::json!({ "error": e.to_string() }))
            }
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "validation_error", "message": e.to_string() }),
            ),
            Self::State(e) => {
                let status = match e {
                    StateError::NotFound(_) => StatusCode::NOT_FOUND,
                    StateError::DuplicateWebhookPath(_) | StateError::IllegalTransition { .. } => {
                        StatusCode::CONFLICT
                    }
                    StateError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, serde_json::json!({ "error": e.to_string() }))
            }
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                serde_json::json!({ "error": "payload_too_large" }),
            ),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": "service unavailable" }),
            ),
            Self::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
            Self::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            ),
        };
        (status, axum::Json(body)).into_response()
    }
}
