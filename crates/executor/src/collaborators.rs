//! External collaborator interfaces: internal actions and outbound delivery.

use async_trait::async_trait;

use reflex_core::HttpMethod;

use crate::context::ActionContext;

/// Error raised by a collaborator while executing one action.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    /// No internal action is registered under the given name.
    #[error("unknown internal action: {0}")]
    UnknownAction(String),

    /// The action's parameters failed the collaborator's own validation.
    #[error("invalid params for {action}: {message}")]
    InvalidParams { action: String, message: String },

    /// The collaborator ran and failed.
    #[error("{0}")]
    Failed(String),
}

/// Registry of named internal operations.
///
/// Implemented outside this subsystem; per-action timeouts, if any, are the
/// registry's responsibility.
#[async_trait]
pub trait InternalActionRegistry: Send + Sync {
    /// Execute the named action with validated params in the run's context.
    async fn execute(
        &self,
        name: &str,
        params: &serde_json::Value,
        ctx: &ActionContext,
    ) -> Result<serde_json::Value, ActionError>;
}

/// A fully prepared outbound webhook delivery.
#[derive(Debug, Clone)]
pub struct SignedDelivery {
    pub url: String,
    pub method: HttpMethod,
    /// Rendered payload body.
    pub body: String,
    /// Unix-seconds timestamp the signature covers.
    pub timestamp: i64,
    /// `sha256=`-prefixed signature header value.
    pub signature: String,
}

/// Outbound webhook delivery collaborator.
///
/// The sender owns its retry/backoff policy (at-least-once); `deliver`
/// returns once the delivery is accepted for sending, and an error here is
/// an action failure.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn deliver(&self, delivery: SignedDelivery) -> Result<(), ActionError>;
}

/// Header carrying the signature timestamp, shared with inbound verification.
pub const TIMESTAMP_HEADER: &str = "X-Reflex-Timestamp";
/// Header carrying the payload signature, shared with inbound verification.
pub const SIGNATURE_HEADER: &str = "X-Reflex-Signature";

/// `reqwest`-backed [`WebhookSender`].
///
/// Fire-and-forget from the executor's perspective: the request is spawned
/// onto the runtime and its outcome is logged, not reported back. Delivery
/// tracking beyond that belongs to the sender, not the executor.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    /// Build a sender with the given request timeout.
    pub fn new(timeout: std::time::Duration) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ActionError::Failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn deliver(&self, delivery: SignedDelivery) -> Result<(), ActionError> {
        let request = match delivery.method {
            HttpMethod::Get => self.client.get(&delivery.url),
            HttpMethod::Post => self.client.post(&delivery.url),
            HttpMethod::Put => self.client.put(&delivery.url),
            HttpMethod::Patch => self.client.patch(&delivery.url),
            HttpMethod::Delete => self.client.delete(&delivery.url),
        }
        .header("Content-Type", "application/json")
        .header(TIMESTAMP_HEADER, delivery.timestamp.to_string())
        .header(SIGNATURE_HEADER, delivery.signature.clone())
        .body(delivery.body.clone());

        let url = delivery.url.clone();
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(url = %url, status = %response.status(), "webhook delivered");
                }
                Ok(response) => {
                    tracing::warn!(url = %url, status = %response.status(), "webhook endpoint returned an error");
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "webhook delivery failed");
                }
            }
        });
        Ok(())
    }
}
