use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::WebhookSecret;
use crate::types::WebhookHeaders;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed distance, in seconds, between the signing timestamp and
/// the verifier's clock, in either direction.
pub const REPLAY_WINDOW_SECS: u64 = 300;

const SIGNATURE_VERSION_PREFIX: &str = "v1,";

/// The triple the provider signs: `"{event_id}.{timestamp}.{body}"`.
#[derive(Debug, Clone, Copy)]
pub struct SignedEnvelope<'a> {
    pub event_id: &'a str,
    /// Timestamp exactly as received; the provider signs the header text.
    pub timestamp: &'a str,
    pub raw_body: &'a [u8],
}

impl SignedEnvelope<'_> {
    pub fn signed_content(&self) -> Vec<u8> {
        let mut content =
            Vec::with_capacity(self.event_id.len() + self.timestamp.len() + self.raw_body.len() + 2);
        content.extend_from_slice(self.event_id.as_bytes());
        content.push(b'.');
        content.extend_from_slice(self.timestamp.as_bytes());
        content.push(b'.');
        content.extend_from_slice(self.raw_body);
        content
    }
}

/// Verifies Standard Webhooks style signatures (`v1,<base64>` candidates
/// over `id.timestamp.body`, HMAC-SHA256 keyed by the decoded secret).
///
/// Never errors: every failure, including an undecodable secret, comes back
/// as `false`.
pub struct SignatureVerifier {
    key: Option<Vec<u8>>,
}

impl SignatureVerifier {
    pub fn new(secret: &WebhookSecret) -> Self {
        let key = match secret.signing_key() {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(error = %e, "webhook secret could not be decoded; all deliveries will be rejected");
                None
            }
        };
        Self { key }
    }

    pub fn verify(&self, raw_body: &[u8], headers: &WebhookHeaders, now: DateTime<Utc>) -> bool {
        let (signature_header, timestamp, event_id) = match (
            headers.signature.as_deref(),
            headers.timestamp.as_deref(),
            headers.event_id.as_deref(),
        ) {
            (Some(s), Some(t), Some(i)) => (s, t, i),
            _ => {
                tracing::debug!("webhook is missing a signature, timestamp or id header");
                return false;
            }
        };

        let timestamp_seconds = match timestamp.trim().parse::<i64>() {
            Ok(ts) => ts,
            Err(_) => {
                tracing::debug!(event_id, "webhook timestamp is not an integer");
                return false;
            }
        };

        let skew = now.timestamp().abs_diff(timestamp_seconds);
        if skew > REPLAY_WINDOW_SECS {
            tracing::debug!(
                event_id,
                now = now.timestamp(),
                timestamp = timestamp_seconds,
                "webhook timestamp outside replay window"
            );
            return false;
        }

        let envelope = SignedEnvelope {
            event_id,
            timestamp,
            raw_body,
        };

        let expected = match self.expected_signature(&envelope) {
            Some(sig) => sig,
            None => return false,
        };

        let is_valid = signature_candidates(signature_header)
            .any(|candidate| constant_time_compare(candidate.as_bytes(), expected.as_bytes()));

        if !is_valid {
            tracing::debug!(event_id, "no webhook signature candidate matched");
        }
        is_valid
    }

    /// Base64 HMAC-SHA256 of the signed content, or `None` if no usable key.
    fn expected_signature(&self, envelope: &SignedEnvelope<'_>) -> Option<String> {
        let key = match &self.key {
            Some(key) => key,
            None => {
                tracing::warn!(event_id = envelope.event_id, "no usable webhook secret configured");
                return None;
            }
        };

        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(&envelope.signed_content());
        let digest = mac.finalize().into_bytes();
        Some(base64::engine::general_purpose::STANDARD.encode(digest))
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Space-separated `v1,<sig>` entries; anything without the prefix is skipped.
fn signature_candidates(header: &str) -> impl Iterator<Item = &str> {
    header
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix(SIGNATURE_VERSION_PREFIX))
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
