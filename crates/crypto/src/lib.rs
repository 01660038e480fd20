//! Webhook signature protocol for Reflex.
//!
//! Both directions of webhook traffic use the same scheme so integrators can
//! verify symmetrically: the signature is HMAC-SHA256 over the canonical
//! string `"{timestamp}.{raw_body}"` keyed by the rule's secret and
//! hex-encoded. The timestamp is Unix seconds; the dot delimiter and the
//! timestamp-then-body order are fixed protocol constants.
//!
//! Verification accepts the signature with or without a `sha256=` prefix and
//! compares in constant time. Replay protection is a separate check: a
//! correctly signed request older (or newer) than [`REPLAY_WINDOW_SECS`] is
//! still rejected.

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age (and forward skew) of a signed request, in seconds.
pub const REPLAY_WINDOW_SECS: i64 = 300;

/// Optional prefix accepted (and emitted) on signature values.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Number of random bytes in a generated webhook secret (hex-encoded to 64
/// characters).
const SECRET_BYTES: usize = 32;

/// Number of random bytes in a generated webhook path suffix.
const PATH_BYTES: usize = 16;

/// Errors from signature computation or verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The supplied signature does not match the computed one.
    #[error("invalid signature")]
    InvalidSignature,
    /// The timestamp is outside the replay window.
    #[error("timestamp outside replay window")]
    TimestampExpired,
    /// The timestamp header is not a valid Unix-seconds integer.
    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),
}

/// Compute the hex-encoded HMAC-SHA256 signature for `(timestamp, body)`.
#[must_use]
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Compute a signature header value with the `sha256=` prefix, as emitted on
/// outbound deliveries.
#[must_use]
pub fn sign_header(secret: &str, timestamp: i64, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", sign(secret, timestamp, body))
}

/// Verify a supplied signature against the expected one for
/// `(timestamp, body)`.
///
/// The optional `sha256=` prefix is stripped before comparison; the
/// comparison itself is constant-time. This checks only the signature -- use
/// [`check_replay_window`] for freshness.
pub fn verify(
    secret: &str,
    timestamp: i64,
    body: &[u8],
    supplied: &str,
) -> Result<(), SignatureError> {
    let supplied = supplied.strip_prefix(SIGNATURE_PREFIX).unwrap_or(supplied);
    let expected = sign(secret, timestamp, body);
    if expected.as_bytes().ct_eq(supplied.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::InvalidSignature)
    }
}

/// Reject timestamps outside the replay window relative to `now`.
///
/// The window is symmetric: requests from the future (clock skew beyond the
/// window) are rejected the same way as stale ones.
pub fn check_replay_window(timestamp: i64, now: i64) -> Result<(), SignatureError> {
    if (now - timestamp).abs() > REPLAY_WINDOW_SECS {
        return Err(SignatureError::TimestampExpired);
    }
    Ok(())
}

/// Parse a timestamp header value as Unix seconds.
pub fn parse_timestamp(value: &str) -> Result<i64, SignatureError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| SignatureError::MalformedTimestamp(value.to_owned()))
}

/// Generate a fresh high-entropy webhook secret (64 hex characters).
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a fresh webhook routing path (`hk_` + 32 hex characters).
///
/// Paths are the sole public routing key, so collisions must be practically
/// impossible; 128 random bits gives that.
#[must_use]
pub fn generate_path() -> String {
    let mut bytes = [0u8; PATH_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("hk_{}", hex::encode(bytes))
}
