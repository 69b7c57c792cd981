//! Slack request signing (`v0` scheme).
//!
//! Slack signs `v0:{timestamp}:{raw body}` with the app's signing secret and
//! sends the hex digest in `X-Slack-Signature` as `v0=<hex>`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const VERSION: &str = "v0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp is {age_secs}s away from now")]
    Stale { age_secs: u64 },
    #[error("signature is not in `v0=<hex>` form")]
    Malformed,
    #[error("signature does not match request body")]
    Mismatch,
    #[error("signing secret cannot be used as an hmac key")]
    InvalidSecret,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    signing_secret: SecretString,
    tolerance: Duration,
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString, tolerance: Duration) -> Self {
        Self { signing_secret, tolerance }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        self.verify_at(timestamp, signature, body, now)
    }

    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now_unix: u64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        let sent_at = timestamp
            .trim()
            .parse::<u64>()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        let age_secs = now_unix.abs_diff(sent_at);
        if age_secs > self.tolerance.as_secs() {
            return Err(SignatureError::Stale { age_secs });
        }

        let digest = signature
            .strip_prefix("v0=")
            .and_then(|encoded| hex::decode(encoded).ok())
            .ok_or(SignatureError::Malformed)?;

        self.mac(timestamp.trim(), body)?
            .verify_slice(&digest)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Produces the `v0=<hex>` header value for a body, as Slack would.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let digest = self.mac(timestamp, body)?.finalize().into_bytes();
        Ok(format!("{VERSION}={}", hex::encode(digest)))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}
