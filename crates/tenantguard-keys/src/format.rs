//! Key format
//!
//! A key is `<env_prefix><payload>` where the payload is ASCII alphanumeric.
//! The first [`LOOKUP_PREFIX_LEN`] characters are stored in clear as a lookup
//! shard; they are not unique.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tenantguard_common::{GateError, GateResult, KeyEnvironment};

/// Characters of the raw key stored for lookup
pub const LOOKUP_PREFIX_LEN: usize = 16;

/// Shortest payload accepted after the environment prefix
pub const MIN_PAYLOAD_LEN: usize = 32;

/// Payload length of newly issued keys
pub const GENERATED_PAYLOAD_LEN: usize = 40;

/// Generate a new raw key for `env`
pub fn generate_secret(env: KeyEnvironment) -> String {
    let payload: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PAYLOAD_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", env.prefix(), payload)
}

/// Check the shape of a raw key and return its environment
pub fn validate_format(raw: &str) -> GateResult<KeyEnvironment> {
    let env = KeyEnvironment::detect(raw).ok_or(GateError::InvalidKeyFormat)?;
    let payload = &raw[env.prefix().len()..];
    if payload.len() < MIN_PAYLOAD_LEN || !payload.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(GateError::InvalidKeyFormat);
    }
    Ok(env)
}

/// Lookup shard of a validated key
pub fn lookup_prefix(raw: &str) -> &str {
    // validate_format guarantees ASCII, so the byte slice is on a char boundary
    &raw[..LOOKUP_PREFIX_LEN.min(raw.len())]
}

/// Token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header: Option<&str>) -> GateResult<&str> {
    let value = header.ok_or(GateError::Unauthorized)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(GateError::Unauthorized)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(GateError::Unauthorized);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(GateError::Unauthorized);
    }
    Ok(token)
}

/// Whether a bearer token should go to the key authenticator rather than
/// the session verifier
pub fn looks_like_api_key(token: &str) -> bool {
    KeyEnvironment::detect(token).is_some()
}
