//! LINE webhook signature verification.
//!
//! LINE signs each delivery with HMAC-SHA256 keyed by the channel secret and
//! sends the base64 digest in the `X-Line-Signature` header.
//! Reference: https://developers.line.biz/en/reference/messaging-api/#signature-validation

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Compute the `X-Line-Signature` value for a raw request body.
///
/// Returns `None` only if the MAC cannot be keyed, which HMAC never rejects.
pub fn compute_signature(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("line_signature_invalid_key");
            return None;
        }
    };

    mac.update(body);

    Some(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verify a LINE webhook signature against the exact bytes received.
///
/// The body must be the raw request body, not a re-serialized payload.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(expected) = compute_signature(secret, body) else {
        return false;
    };

    let valid: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            body_length = body.len(),
            "line_signature_mismatch"
        );
    }

    valid
}
