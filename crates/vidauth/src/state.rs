//! Self-certifying OAuth `state` tokens.
//!
//! A state token is `base64url(nonce || issued_at || tag)` where the tag is an
//! HMAC-SHA256 over the nonce and issuance time keyed with the per-instance
//! [`SessionSecret`]. Nothing is stored server-side: a token is valid iff the
//! tag verifies under the secret (and, for [`validate_fresh`], it is recent).

use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of the session secret in bytes.
pub const SECRET_LEN: usize = 32;

const NONCE_LEN: usize = 16;
const TIMESTAMP_LEN: usize = 8;
const TAG_LEN: usize = 32;
const PAYLOAD_LEN: usize = NONCE_LEN + TIMESTAMP_LEN;
const TOKEN_LEN: usize = PAYLOAD_LEN + TAG_LEN;

/// Tolerated clock skew for tokens stamped in the future.
const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// Reasons a state token can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The value is not base64url or has the wrong length.
    #[error("malformed state")]
    Malformed,

    /// The authentication tag does not verify under this instance's secret.
    #[error("state was tampered with or forged")]
    TamperedOrForged,

    /// The token is authentic but older than the accepted window.
    #[error("state has expired")]
    Expired,
}

/// Symmetric key used to authenticate state tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret([u8; SECRET_LEN]);

impl SessionSecret {
    /// Generate a fresh random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Encode for persistence.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode a secret previously produced by [`SessionSecret::encode`].
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim()).ok()?;
        let bytes: [u8; SECRET_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// Mint a new state token under `secret`.
pub fn mint(secret: &SessionSecret) -> String {
    mint_at(secret, chrono::Utc::now().timestamp())
}

pub(crate) fn mint_at(secret: &SessionSecret, issued_at: i64) -> String {
    let mut raw = [0u8; TOKEN_LEN];
    rand::rng().fill_bytes(&mut raw[..NONCE_LEN]);
    raw[NONCE_LEN..PAYLOAD_LEN].copy_from_slice(&issued_at.to_be_bytes());

    let mut mac = keyed_mac(secret);
    mac.update(&raw[..PAYLOAD_LEN]);
    raw[PAYLOAD_LEN..].copy_from_slice(&mac.finalize().into_bytes());

    URL_SAFE_NO_PAD.encode(raw)
}

/// Verify that `token` was minted under `secret` and not modified.
pub fn validate(token: &str, secret: &SessionSecret) -> Result<(), StateError> {
    authenticate(token, secret).map(|_| ())
}

/// Like [`validate`], additionally rejecting tokens older than `max_age`.
pub fn validate_fresh(
    token: &str,
    secret: &SessionSecret,
    max_age: Duration,
) -> Result<(), StateError> {
    validate_fresh_at(token, secret, max_age, chrono::Utc::now().timestamp())
}

pub(crate) fn validate_fresh_at(
    token: &str,
    secret: &SessionSecret,
    max_age: Duration,
    now: i64,
) -> Result<(), StateError> {
    let issued_at = authenticate(token, secret)?;
    let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);

    if issued_at > now.saturating_add(MAX_FUTURE_SKEW_SECS) {
        return Err(StateError::Expired);
    }
    if now.saturating_sub(issued_at) > max_age {
        return Err(StateError::Expired);
    }
    Ok(())
}

/// Decode and verify the tag, returning the authenticated issuance time.
fn authenticate(token: &str, secret: &SessionSecret) -> Result<i64, StateError> {
    let raw = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| StateError::Malformed)?;
    if raw.len() != TOKEN_LEN {
        return Err(StateError::Malformed);
    }

    let (payload, tag) = raw.split_at(PAYLOAD_LEN);
    let mut mac = keyed_mac(secret);
    mac.update(payload);
    mac.verify_slice(tag)
        .map_err(|_| StateError::TamperedOrForged)?;

    let mut ts = [0u8; TIMESTAMP_LEN];
    ts.copy_from_slice(&payload[NONCE_LEN..]);
    Ok(i64::from_be_bytes(ts))
}

fn keyed_mac(secret: &SessionSecret) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}
