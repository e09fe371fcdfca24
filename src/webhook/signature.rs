// SPDX-License-Identifier: MIT
//! Webhook signature verification.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw body and sends
//! the hex digest in `X-Hub-Signature-256` as `sha256=<hex>`. Verify before
//! parsing a single byte of payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Check `signature_header` against the HMAC of `body` under `secret`.
///
/// Any malformed header is simply invalid. The digest comparison itself is
/// constant-time (`verify_slice`).
pub fn verify(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_a_correctly_signed_body() {
        let body = br#"{"action":"opened"}"#;
        let header = sign("s3cret", body);
        assert!(verify("s3cret", body, &header));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let header = sign("s3cret", br#"{"action":"opened"}"#);
        assert!(!verify("s3cret", br#"{"action":"closed"}"#, &header));
    }

    #[test]
    fn rejects_the_wrong_secret() {
        let body = b"payload";
        let header = sign("s3cret", body);
        assert!(!verify("other", body, &header));
    }

    #[test]
    fn rejects_malformed_headers() {
        let body = b"payload";
        assert!(!verify("s3cret", body, ""));
        assert!(!verify("s3cret", body, "sha1=abcdef"));
        assert!(!verify("s3cret", body, "sha256=nothex"));
        assert!(!verify("s3cret", body, "sha256=abcd"));
    }
}
