use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{self, Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

use reflex_core::{
    ActionSpec, AutomationRule, IpAllowlist, RuleScope, TriggerConfig, WebhookSecret,
};
use reflex_engine::{EngineBuilder, EngineRuntime};
use reflex_executor::{ActionError, SignedDelivery, WebhookSender};
use reflex_server::actions::BuiltinActionRegistry;
use reflex_server::api::{AppState, router};
use reflex_state::{RuleStore, RunStore};
use reflex_state_memory::MemoryStore;

// -- Helpers --------------------------------------------------------------

struct NullSender;

#[async_trait]
impl WebhookSender for NullSender {
    async fn deliver(&self, _delivery: SignedDelivery) -> Result<(), ActionError> {
        Ok(())
    }
}

// The returned runtime holds the run-queue receiver; tests must keep it
// alive or ingestion fails with a closed-queue 503.
fn build_state() -> (AppState, Arc<MemoryStore>, EngineRuntime) {
    build_state_trusting(IpAllowlist::default())
}

fn build_state_trusting(
    trusted_proxies: IpAllowlist,
) -> (AppState, Arc<MemoryStore>, EngineRuntime) {
    let store = Arc::new(MemoryStore::new());
    let (engine, runtime) = EngineBuilder::new(
        store.clone(),
        store.clone(),
        Arc::new(BuiltinActionRegistry),
        Arc::new(NullSender),
    )
    .default_signing_secret("outbound-secret")
    .build();
    (
        AppState {
            engine: Arc::new(engine),
            rules: store.clone(),
            trusted_proxies,
        },
        store,
        runtime,
    )
}

fn build_app(state: AppState) -> axum::Router {
    router(state)
}

fn hook_rule(path: &str, secret: &str) -> AutomationRule {
    AutomationRule::new(
        "t1",
        RuleScope::Tenant,
        "inbound hook",
        TriggerConfig::Webhook {
            path: path.to_owned(),
            secret: WebhookSecret::new(secret),
            allowed_ips: IpAllowlist::default(),
        },
        vec![ActionSpec::InternalAction {
            action: "log".into(),
            params: serde_json::Value::Null,
        }],
    )
}

/// Build a correctly signed `POST /hooks/{path}` request from a local peer.
fn signed_hook_request(path: &str, secret: &str, body: &str, timestamp: i64) -> Request<Body> {
    signed_hook_request_from(path, secret, body, timestamp, "127.0.0.1".parse().unwrap(), None)
}

/// Build a correctly signed hook request with an explicit peer address and an
/// optional `X-Forwarded-For` header.
fn signed_hook_request_from(
    path: &str,
    secret: &str,
    body: &str,
    timestamp: i64,
    peer: IpAddr,
    forwarded_for: Option<&str>,
) -> Request<Body> {
    let signature = reflex_crypto::sign_header(secret, timestamp, body.as_bytes());
    let mut builder = Request::builder()
        .method(http::Method::POST)
        .uri(format!("/hooks/{path}"))
        .header("X-Reflex-Timestamp", timestamp.to_string())
        .header("X-Reflex-Signature", signature)
        .extension(ConnectInfo(SocketAddr::new(peer, 41234)));
    if let Some(forwarded) = forwarded_for {
        builder = builder.header("X-Forwarded-For", forwarded);
    }
    builder.body(Body::from(body.to_owned())).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn json_request(method: http::Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// -- Health ---------------------------------------------------------------

#[tokio::test]
async fn health_returns_200() {
    let (state, _, _runtime) = build_state();
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

// -- Webhook ingestion ----------------------------------------------------

#[tokio::test]
async fn valid_signed_hook_is_accepted() {
    let (state, store, _runtime) = build_state();
    store.insert_rule(hook_rule("hk_test", "s3cr3t")).await.unwrap();
    let app = build_app(state);

    let response = app
        .oneshot(signed_hook_request(
            "hk_test",
            "s3cr3t",
            r#"{"order_id": 42}"#,
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "accepted");
    let run_id: reflex_core::RunId = json["run_id"].as_str().unwrap().into();

    let run = store.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.trigger_snapshot.payload["order_id"], 42);
    assert_eq!(run.trigger_snapshot.source_ip.as_deref(), Some("127.0.0.1"));
}

#[tokio::test]
async fn wrong_secret_is_401_invalid_signature() {
    let (state, store, _runtime) = build_state();
    store.insert_rule(hook_rule("hk_test", "s3cr3t")).await.unwrap();
    let app = build_app(state);

    let response = app
        .oneshot(signed_hook_request(
            "hk_test",
            "wrong",
            "{}",
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "invalid_signature");
}

#[tokio::test]
async fn stale_timestamp_is_401_timestamp_expired() {
    let (state, store, _runtime) = build_state();
    store.insert_rule(hook_rule("hk_test", "s3cr3t")).await.unwrap();
    let app = build_app(state);

    // Correctly signed, but 301 seconds old.
    let response = app
        .oneshot(signed_hook_request(
            "hk_test",
            "s3cr3t",
            "{}",
            Utc::now().timestamp() - 301,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "timestamp_expired");
}

#[tokio::test]
async fn unknown_path_is_404() {
    let (state, _, _runtime) = build_state();
    let app = build_app(state);

    let response = app
        .oneshot(signed_hook_request(
            "hk_missing",
            "s3cr3t",
            "{}",
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn disabled_rule_is_422_despite_valid_signature() {
    let (state, store, _runtime) = build_state();
    let mut rule = hook_rule("hk_test", "s3cr3t");
    rule.enabled = false;
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .oneshot(signed_hook_request(
            "hk_test",
            "s3cr3t",
            "{}",
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["error"], "rule_disabled");
}

#[tokio::test]
async fn source_outside_allowlist_is_403() {
    let (state, store, _runtime) = build_state();
    let mut rule = hook_rule("hk_test", "s3cr3t");
    if let TriggerConfig::Webhook {
        ref mut allowed_ips,
        ..
    } = rule.trigger
    {
        *allowed_ips = IpAllowlist::parse(&["10.0.0.0/8".to_owned()]).unwrap();
    }
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    // Peer 127.0.0.1 is outside 10.0.0.0/8.
    let response = app
        .oneshot(signed_hook_request(
            "hk_test",
            "s3cr3t",
            "{}",
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "ip_not_allowed");
}

#[tokio::test]
async fn forwarded_header_from_untrusted_peer_cannot_bypass_allowlist() {
    let (state, store, _runtime) = build_state();
    let mut rule = hook_rule("hk_test", "s3cr3t");
    if let TriggerConfig::Webhook {
        ref mut allowed_ips,
        ..
    } = rule.trigger
    {
        *allowed_ips = IpAllowlist::parse(&["10.0.0.0/8".to_owned()]).unwrap();
    }
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    // No trusted proxies configured: the header claiming an allowlisted
    // address is ignored and the peer address is checked instead.
    let response = app
        .oneshot(signed_hook_request_from(
            "hk_test",
            "s3cr3t",
            "{}",
            Utc::now().timestamp(),
            "127.0.0.1".parse().unwrap(),
            Some("10.1.2.3"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "ip_not_allowed");
}

#[tokio::test]
async fn forwarded_header_from_trusted_proxy_is_honored() {
    let trusted = IpAllowlist::parse(&["127.0.0.1".to_owned()]).unwrap();
    let (state, store, _runtime) = build_state_trusting(trusted);
    let mut rule = hook_rule("hk_test", "s3cr3t");
    if let TriggerConfig::Webhook {
        ref mut allowed_ips,
        ..
    } = rule.trigger
    {
        *allowed_ips = IpAllowlist::parse(&["10.0.0.0/8".to_owned()]).unwrap();
    }
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .oneshot(signed_hook_request_from(
            "hk_test",
            "s3cr3t",
            r#"{"ok": true}"#,
            Utc::now().timestamp(),
            "127.0.0.1".parse().unwrap(),
            Some("10.1.2.3"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let run_id: reflex_core::RunId = json["run_id"].as_str().unwrap().into();
    let run = store.get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.trigger_snapshot.source_ip.as_deref(), Some("10.1.2.3"));
}

#[tokio::test]
async fn oversized_body_is_413() {
    let (state, store, _runtime) = build_state();
    store.insert_rule(hook_rule("hk_test", "s3cr3t")).await.unwrap();
    let app = build_app(state);

    let body = "x".repeat(1024 * 1024 + 1);
    let response = app
        .oneshot(signed_hook_request(
            "hk_test",
            "s3cr3t",
            &body,
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["error"], "payload_too_large");
}

// -- Rule management ------------------------------------------------------

#[tokio::test]
async fn create_returns_credentials_exactly_once() {
    let (state, _, _runtime) = build_state();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            http::Method::POST,
            "/v1/rules",
            serde_json::json!({
                "tenant_id": "t1",
                "scope": {"kind": "tenant"},
                "rule": {
                    "name": "order hook",
                    "trigger": {"type": "webhook"},
                    "actions": [{"type": "internal_action", "action": "log"}],
                },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let path = created["credentials"]["path"].as_str().unwrap();
    let secret = created["credentials"]["secret"].as_str().unwrap();
    assert!(path.starts_with("hk_"));
    assert_eq!(secret.len(), 64);

    // The read endpoint never shows the secret again.
    let id = created["id"].as_str().unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/rules/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(!text.contains(secret));
    assert!(text.contains(path));
}

#[tokio::test]
async fn invalid_config_is_400_with_field_message() {
    let (state, _, _runtime) = build_state();
    let app = build_app(state);

    let response = app
        .oneshot(json_request(
            http::Method::POST,
            "/v1/rules",
            serde_json::json!({
                "tenant_id": "t1",
                "scope": {"kind": "tenant"},
                "rule": {"name": "no trigger", "actions": []},
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "validation_error");
    assert_eq!(json["message"], "trigger is required");
}

#[tokio::test]
async fn agent_scoped_rule_requires_task() {
    let (state, _, _runtime) = build_state();
    let app = build_app(state);

    let response = app
        .oneshot(json_request(
            http::Method::POST,
            "/v1/rules",
            serde_json::json!({
                "tenant_id": "t1",
                "scope": {"kind": "agent", "agent_id": "a1"},
                "rule": {
                    "name": "agent rule",
                    "trigger": {"type": "event", "event_type": "message.created"},
                },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "task is required");
}

#[tokio::test]
async fn update_preserves_webhook_credentials() {
    let (state, store, _runtime) = build_state();
    let rule = hook_rule("hk_stable", "s3cr3t");
    let id = rule.id.clone();
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            http::Method::PUT,
            &format!("/v1/rules/{id}"),
            serde_json::json!({
                "name": "renamed hook",
                "trigger": {"type": "webhook"},
                "actions": [{"type": "internal_action", "action": "log"}],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["name"], "renamed hook");
    assert_eq!(json["trigger"]["path"], "hk_stable");

    // The original secret still authenticates.
    let response = app
        .oneshot(signed_hook_request(
            "hk_stable",
            "s3cr3t",
            "{}",
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rotate_invalidates_the_old_secret() {
    let (state, store, _runtime) = build_state();
    let rule = hook_rule("hk_rotate", "old-secret");
    let id = rule.id.clone();
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(empty_post(&format!("/v1/rules/{id}/rotate")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    // The path is the caller's URL and survives rotation.
    assert_eq!(json["credentials"]["path"], "hk_rotate");
    let new_secret = json["credentials"]["secret"].as_str().unwrap().to_owned();
    assert_ne!(new_secret, "old-secret");

    let now = Utc::now().timestamp();
    let response = app
        .clone()
        .oneshot(signed_hook_request("hk_rotate", "old-secret", "{}", now))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(signed_hook_request("hk_rotate", &new_secret, "{}", now))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rotate_on_event_rule_is_a_validation_error() {
    let (state, store, _runtime) = build_state();
    let rule = AutomationRule::new(
        "t1",
        RuleScope::Tenant,
        "ev",
        TriggerConfig::Event {
            event_type: "message.created".into(),
            mention_filter: None,
        },
        vec![ActionSpec::InternalAction {
            action: "log".into(),
            params: serde_json::Value::Null,
        }],
    );
    let id = rule.id.clone();
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .oneshot(empty_post(&format!("/v1/rules/{id}/rotate")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disable_then_enable_round_trip() {
    let (state, store, _runtime) = build_state();
    let rule = hook_rule("hk_toggle", "s3cr3t");
    let id = rule.id.clone();
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(empty_post(&format!("/v1/rules/{id}/disable")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["enabled"], false);

    let now = Utc::now().timestamp();
    let response = app
        .clone()
        .oneshot(signed_hook_request("hk_toggle", "s3cr3t", "{}", now))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(empty_post(&format!("/v1/rules/{id}/enable")))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["enabled"], true);

    let response = app
        .oneshot(signed_hook_request("hk_toggle", "s3cr3t", "{}", now))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deleted_rule_stops_triggering_but_stays_readable() {
    let (state, store, _runtime) = build_state();
    let rule = hook_rule("hk_gone", "s3cr3t");
    let id = rule.id.clone();
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::DELETE)
                .uri(format!("/v1/rules/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(signed_hook_request(
            "hk_gone",
            "s3cr3t",
            "{}",
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Historical reads keep working.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/rules/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["deleted_at"].is_string());
}

// -- Events and runs ------------------------------------------------------

#[tokio::test]
async fn event_injection_creates_runs_for_matches() {
    let (state, store, _runtime) = build_state();
    store
        .insert_rule(AutomationRule::new(
            "t1",
            RuleScope::Tenant,
            "on message",
            TriggerConfig::Event {
                event_type: "message.created".into(),
                mention_filter: None,
            },
            vec![ActionSpec::InternalAction {
                action: "log".into(),
                params: serde_json::Value::Null,
            }],
        ))
        .await
        .unwrap();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            http::Method::POST,
            "/v1/events",
            serde_json::json!({
                "tenant_id": "t1",
                "event_type": "message.created",
                "actor": "user-7",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let runs = json_body(response).await;
    assert_eq!(runs.as_array().unwrap().len(), 1);
    assert_eq!(runs[0]["trigger_source"], "event");

    // A non-matching event is accepted with an empty list.
    let response = app
        .oneshot(json_request(
            http::Method::POST,
            "/v1/events",
            serde_json::json!({
                "tenant_id": "t1",
                "event_type": "other.event",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(json_body(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn run_listing_and_cancel_lifecycle() {
    let (state, store, _runtime) = build_state();
    let rule = hook_rule("hk_runs", "s3cr3t");
    let rule_id = rule.id.clone();
    store.insert_rule(rule).await.unwrap();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(signed_hook_request(
            "hk_runs",
            "s3cr3t",
            "{}",
            Utc::now().timestamp(),
        ))
        .await
        .unwrap();
    let run_id = json_body(response).await["run_id"]
        .as_str()
        .unwrap()
        .to_owned();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/rules/{rule_id}/runs"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let runs = json_body(response).await;
    assert_eq!(runs[0]["id"], run_id.as_str());
    assert_eq!(runs[0]["status"], "pending");

    // Cancel the pending run, then cancel again: the second call is a no-op
    // reporting the current status.
    let response = app
        .clone()
        .oneshot(empty_post(&format!("/v1/runs/{run_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "cancelled");

    let response = app
        .clone()
        .oneshot(empty_post(&format!("/v1/runs/{run_id}/cancel")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "cancelled");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/runs/{run_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "cancelled");
}

#[tokio::test]
async fn unknown_run_and_rule_are_404() {
    let (state, _, _runtime) = build_state();
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/runs/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/rules/nope/runs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
