//! Webhook authentication
//!
//! GitHub signs the raw request body with HMAC-SHA256 and sends it as
//! `sha256=<hex>` in `x-hub-signature-256`. GitLab echoes the configured
//! secret verbatim in `x-gitlab-token`. Every comparison goes through the
//! MAC's constant-time verification.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";

/// Decodes `sha256=<hex>`, `None` for any other shape
fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

fn mac(secret: &[u8], payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(mac)
}

/// Checks a GitHub `x-hub-signature-256` value against the raw body
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };

    mac(secret, payload).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}

/// Compares a presented secret with the configured one in constant time
///
/// Both sides are MAC-ed under the configured secret, so neither the length
/// nor the first differing byte shows in the timing.
pub fn secrets_match(presented: &str, secret: &str) -> bool {
    let Some(expected) = mac(secret.as_bytes(), secret.as_bytes()) else {
        return false;
    };
    let expected = expected.finalize().into_bytes();

    mac(secret.as_bytes(), presented.as_bytes())
        .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}

/// Whether a webhook delivery proves knowledge of `secret`
///
/// A GitHub signature takes precedence over a GitLab token. A delivery with
/// neither is rejected.
pub fn authenticate(headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
    if let Some(signature) = headers.get(GITHUB_SIGNATURE_HEADER) {
        return signature
            .to_str()
            .is_ok_and(|signature| verify_signature(body, signature, secret.as_bytes()));
    }

    if let Some(token) = headers.get(GITLAB_TOKEN_HEADER) {
        return token
            .to_str()
            .is_ok_and(|token| secrets_match(token, secret));
    }

    false
}

/// `sha256=<hex>` signature of `payload`, as GitHub would send it
#[cfg(test)]
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mac = mac(secret.as_bytes(), payload).unwrap();
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    // GitHub's published example delivery
    const SECRET: &str = "It's a Secret to Everybody";
    const PAYLOAD: &[u8] = b"Hello, World!";
    const SIGNATURE: &str =
        "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";

    #[test]
    fn test_known_signature() {
        assert_eq!(sign(PAYLOAD, SECRET), SIGNATURE);
        assert!(verify_signature(PAYLOAD, SIGNATURE, SECRET.as_bytes()));
    }

    #[test]
    fn test_rejects_bad_signatures() {
        assert!(!verify_signature(b"Hello, World?", SIGNATURE, SECRET.as_bytes()));
        assert!(!verify_signature(PAYLOAD, SIGNATURE, b"another secret"));
        assert!(!verify_signature(PAYLOAD, &SIGNATURE[7..], SECRET.as_bytes()));
        assert!(!verify_signature(PAYLOAD, "sha1=757107ea", SECRET.as_bytes()));
        assert!(!verify_signature(PAYLOAD, "sha256=zz", SECRET.as_bytes()));
        assert!(!verify_signature(PAYLOAD, "sha256=", SECRET.as_bytes()));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("hunter2", "hunter2"));
        assert!(!secrets_match("hunter", "hunter2"));
        assert!(!secrets_match("hunter22", "hunter2"));
        assert!(!secrets_match("", "hunter2"));
    }

    #[test]
    fn test_authenticate() {
        let mut github = HeaderMap::new();
        github.insert(GITHUB_SIGNATURE_HEADER, HeaderValue::from_static(SIGNATURE));
        assert!(authenticate(&github, PAYLOAD, SECRET));
        assert!(!authenticate(&github, b"tampered", SECRET));

        let mut gitlab = HeaderMap::new();
        gitlab.insert(GITLAB_TOKEN_HEADER, HeaderValue::from_static("hunter2"));
        assert!(authenticate(&gitlab, PAYLOAD, "hunter2"));
        assert!(!authenticate(&gitlab, PAYLOAD, "hunter3"));

        // a valid token does not rescue a bad signature
        let mut both = gitlab.clone();
        both.insert(GITHUB_SIGNATURE_HEADER, HeaderValue::from_static("sha256=00"));
        assert!(!authenticate(&both, PAYLOAD, "hunter2"));

        assert!(!authenticate(&HeaderMap::new(), PAYLOAD, SECRET));
    }
}
