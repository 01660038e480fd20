//! Inbound webhook ingestion (`POST /hooks/{path}`).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;

use reflex_core::IpAllowlist;
use reflex_engine::InboundWebhook;
use reflex_executor::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

use crate::error::ServerError;

use super::AppState;
use super::schemas::AcceptedResponse;

/// Cap on hook bodies. The body is snapshotted onto the run record, so
/// unbounded payloads would bloat the store.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// `POST /hooks/{path}` -- authenticate and accept an inbound webhook.
///
/// The body is read raw; signature verification happens over the exact bytes
/// received. A 200 response means a pending run was created and queued, not
/// that its actions have executed.
pub async fn ingest(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ServerError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ServerError::PayloadTooLarge)?;

    let timestamp_header = header_str(&parts, TIMESTAMP_HEADER);
    let signature_header = header_str(&parts, SIGNATURE_HEADER);

    let run = state
        .engine
        .ingest_webhook(&InboundWebhook {
            path: &path,
            body: &body,
            timestamp_header,
            signature_header,
            source_ip: client_ip(&parts, &state.trusted_proxies),
        })
        .await?;

    Ok((
        StatusCode::OK,
        Json(AcceptedResponse {
            status: "accepted",
            run_id: run.id.as_str().to_owned(),
        }),
    ))
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Source address for the allowlist check.
///
/// `X-Forwarded-For` is client-controlled, so it is honored only when the
/// socket peer is one of the configured trusted proxies; every other
/// connection is attributed to its peer address. With no trusted proxies
/// configured the header is always ignored.
fn client_ip(parts: &Parts, trusted_proxies: &IpAllowlist) -> IpAddr {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip());

    // IpAllowlist treats empty as allow-all; an empty proxy list must mean
    // the opposite here.
    if trusted_proxies.is_empty() || !trusted_proxies.allows(peer) {
        return peer;
    }
    header_str(parts, "X-Forwarded-For")
        .and_then(|forwarded| {
            forwarded
                .split(',')
                .next()
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
        .unwrap_or(peer)
}
