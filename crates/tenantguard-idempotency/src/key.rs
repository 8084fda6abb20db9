//! Key derivation and request fingerprints

use sha2::{Digest, Sha256};
use tenantguard_common::{GateError, GateResult};

/// Header carrying a caller-supplied key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Prefix of keys derived from request content
pub const DERIVED_KEY_PREFIX: &str = "auto_";

/// Longest caller-supplied key accepted
pub const MAX_KEY_LEN: usize = 255;

fn digest(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// SHA-256 over method, path and body
pub fn fingerprint(method: &str, path: &str, body: &[u8]) -> String {
    digest(method, path, body)
}

/// The caller's key when present, otherwise one derived from the request content
pub fn resolve_key(header: Option<&str>, method: &str, path: &str, body: &[u8]) -> GateResult<String> {
    match header.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) if key.len() > MAX_KEY_LEN => Err(GateError::InvalidRequestBody(format!(
            "Idempotency-Key longer than {MAX_KEY_LEN} characters"
        ))),
        Some(key) => Ok(key.to_string()),
        None => Ok(format!("{DERIVED_KEY_PREFIX}{}", digest(method, path, body))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_wins() {
        let key = resolve_key(Some(" order-42 "), "POST", "/api/v1/payments", b"{}").unwrap();
        assert_eq!(key, "order-42");
    }

    #[test]
    fn test_derived_key_is_deterministic() {
        let a = resolve_key(None, "POST", "/api/v1/payments", br#"{"amount":10}"#).unwrap();
        let b = resolve_key(Some("  "), "POST", "/api/v1/payments", br#"{"amount":10}"#).unwrap();
        let c = resolve_key(None, "POST", "/api/v1/payments", br#"{"amount":11}"#).unwrap();
        assert!(a.starts_with(DERIVED_KEY_PREFIX));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_oversized_key_rejected() {
        let long = "k".repeat(MAX_KEY_LEN + 1);
        let err = resolve_key(Some(&long), "POST", "/x", b"").unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_fingerprint_covers_path() {
        assert_ne!(fingerprint("POST", "/a", b"x"), fingerprint("POST", "/b", b"x"));
        assert_eq!(fingerprint("POST", "/a", b"x").len(), 64);
    }
}
