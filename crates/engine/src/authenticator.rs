//! Inbound webhook authentication.
//!
//! Stateless over the rule store: safe to call from any number of concurrent
//! request handlers.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use reflex_core::{AutomationRule, TriggerConfig};
use reflex_state::{RuleStore, StateError};

/// Typed authentication failure, one variant per rejection response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No rule is registered under the webhook path. Also returned for
    /// soft-deleted rules so that path probing never leaks existence.
    #[error("not_found")]
    NotFound,
    /// Missing, malformed, or mismatched signature (or timestamp header).
    #[error("invalid_signature")]
    InvalidSignature,
    /// Correctly signed but outside the replay window.
    #[error("timestamp_expired")]
    TimestampExpired,
    /// The rule exists but is disabled: recognized, not active.
    #[error("rule_disabled")]
    RuleDisabled,
    /// The source address is not on the rule's allowlist.
    #[error("ip_not_allowed")]
    IpNotAllowed,
}

/// An inbound call to `POST /hooks/{path}`, reduced to what authentication
/// needs.
#[derive(Debug, Clone)]
pub struct InboundWebhook<'a> {
    /// The `{path}` segment of the request.
    pub path: &'a str,
    /// Raw body bytes, exactly as received.
    pub body: &'a [u8],
    /// Value of the timestamp header, if present.
    pub timestamp_header: Option<&'a str>,
    /// Value of the signature header, if present (`sha256=<hex>` or bare).
    pub signature_header: Option<&'a str>,
    /// Source address of the connection.
    pub source_ip: IpAddr,
}

/// Verifies inbound webhook calls against the owning rule's secret, replay
/// window, and IP allowlist.
pub struct WebhookAuthenticator {
    rules: Arc<dyn RuleStore>,
}

impl WebhookAuthenticator {
    #[must_use]
    pub fn new(rules: Arc<dyn RuleStore>) -> Self {
        Self { rules }
    }

    /// Authenticate a request and return the matched rule.
    ///
    /// Check order is fixed: path lookup, signature, replay window, enabled
    /// flag, allowlist. The replay check runs after (and independently of)
    /// signature validity so a stale-but-correctly-signed request is still
    /// rejected.
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn authenticate(
        &self,
        request: &InboundWebhook<'_>,
    ) -> Result<AutomationRule, AuthenticateError> {
        let rule = self
            .rules
            .find_by_webhook_path(request.path)
            .await?
            .filter(|r| r.deleted_at.is_none())
            .ok_or(AuthError::NotFound)?;

        let TriggerConfig::Webhook {
            ref secret,
            ref allowed_ips,
            ..
        } = rule.trigger
        else {
            // Path index points at a rule that is no longer webhook-triggered.
            return Err(AuthError::NotFound.into());
        };

        let (Some(timestamp_header), Some(signature_header)) =
            (request.timestamp_header, request.signature_header)
        else {
            debug!("missing timestamp or signature header");
            return Err(AuthError::InvalidSignature.into());
        };
        let timestamp = reflex_crypto::parse_timestamp(timestamp_header)
            .map_err(|_| AuthError::InvalidSignature)?;
        reflex_crypto::verify(secret.expose(), timestamp, request.body, signature_header)
            .map_err(|_| AuthError::InvalidSignature)?;

        reflex_crypto::check_replay_window(timestamp, Utc::now().timestamp())
            .map_err(|_| AuthError::TimestampExpired)?;

        if !rule.enabled {
            return Err(AuthError::RuleDisabled.into());
        }

        if !allowed_ips.allows(request.source_ip) {
            debug!(source_ip = %request.source_ip, "source address not on allowlist");
            return Err(AuthError::IpNotAllowed.into());
        }

        Ok(rule)
    }
}

/// Authentication outcome: a typed rejection or a store failure.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticateError {
    #[error(transparent)]
    Rejected(#[from] AuthError),
    #[error(transparent)]
    State(#[from] StateError),
}
