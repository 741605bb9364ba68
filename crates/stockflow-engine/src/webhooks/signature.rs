//! HMAC-SHA256 payload signing.
//!
//! The signature is computed over the exact serialized request body and
//! sent as `X-Webhook-Signature: sha256=<hex>`. `verify` is what a
//! receiver would run; it is also used by the delivery tests.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
const SIGNATURE_PREFIX: &str = "sha256=";

/// Sign `body` with `secret`, producing the full header value.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a received header value against `body`.
pub fn verify(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_digest) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
