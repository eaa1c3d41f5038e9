//! LINE webhook signature verification.
//!
//! LINE signs each request body with HMAC-SHA256 keyed by the channel secret
//! and sends the base64 digest in `X-Line-Signature`.
//! Reference: https://developers.line.biz/en/reference/messaging-api/#signature-validation

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Verify a LINE webhook signature.
///
/// # Arguments
///
/// * `channel_secret` - The store's channel secret
/// * `body` - The raw request body, exactly as received
/// * `signature` - The `X-Line-Signature` header value
///
/// # Returns
///
/// `true` only if the secret is configured and the signature matches.
pub fn verify_line_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    if channel_secret.is_empty() || signature.is_empty() {
        warn!(
            has_channel_secret = !channel_secret.is_empty(),
            has_signature = !signature.is_empty(),
            "line_signature_missing_fields"
        );
        return false;
    }

    let provided = match STANDARD.decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(signature_length = signature.len(), "line_signature_not_base64");
            return false;
        }
    };

    let expected = match compute_signature(channel_secret, body) {
        Some(digest) => digest,
        None => {
            warn!("line_signature_invalid_key");
            return false;
        }
    };

    let valid = constant_time_compare(&expected, &provided);
    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = provided.len(),
            "line_signature_mismatch"
        );
    }

    valid
}

/// HMAC-SHA256 of `body` keyed by `channel_secret`.
fn compute_signature(channel_secret: &str, body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Base64-encoded signature for `body`, as LINE would send it.
pub fn sign_body(channel_secret: &str, body: &[u8]) -> Option<String> {
    compute_signature(channel_secret, body).map(|digest| STANDARD.encode(digest))
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
