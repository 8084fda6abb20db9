//! Session tokens (HS256 JWT)
//!
//! The alternative to API keys for interactive users. Expiry is checked
//! against the injected clock rather than the wall clock.

use crate::config::SessionSettings;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tenantguard_common::{GateError, GateResult, SharedClock, TenantId};
use tracing::debug;

/// Session claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub tenant_id: TenantId,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Verifies (and for tooling, mints) session tokens
pub struct SessionVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
    token_ttl: chrono::Duration,
    clock: SharedClock,
}

impl std::fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVerifier")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl SessionVerifier {
    pub fn new(settings: &SessionSettings, clock: SharedClock) -> Self {
        let secret = settings.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            token_ttl: chrono::Duration::seconds(i64::try_from(settings.token_ttl_secs).unwrap_or(i64::MAX / 2)),
            clock,
        }
    }

    /// Decode and check a bearer token
    pub fn verify(&self, token: &str) -> GateResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "session token rejected");
                GateError::Unauthenticated
            })?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            debug!(sub = %claims.sub, "session token expired");
            return Err(GateError::Unauthenticated);
        }
        Ok(claims)
    }

    /// Mint a token for `sub` in `tenant_id`
    pub fn issue(&self, sub: &str, tenant_id: &TenantId, role: &str) -> GateResult<String> {
        let now = self.clock.now();
        let claims = Claims {
            sub: sub.to_string(),
            tenant_id: tenant_id.clone(),
            role: role.to_string(),
            exp: (now + self.token_ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| GateError::Internal(format!("failed to sign session token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tenantguard_common::ManualClock;

    fn verifier(settings: SessionSettings) -> (SessionVerifier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()));
        (SessionVerifier::new(&settings, clock.clone()), clock)
    }

    #[test]
    fn test_issue_then_verify() {
        let (sessions, _) = verifier(SessionSettings::default());
        let token = sessions.issue("user-1", &TenantId::new("acme"), "admin").unwrap();

        let claims = sessions.verify(&token).unwrap();
        assert_eq!(claims.tenant_id, TenantId::new("acme"));
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn test_expiry_follows_injected_clock() {
        let (sessions, clock) = verifier(SessionSettings::default());
        let token = sessions.issue("user-1", &TenantId::new("acme"), "member").unwrap();

        clock.advance(chrono::Duration::hours(2));
        let err = sessions.verify(&token).unwrap_err();
        assert_eq!(err.code(), "UNAUTHENTICATED");
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let (ours, _) = verifier(SessionSettings::default());
        let (theirs, _) = verifier(SessionSettings {
            jwt_secret: "someone-else".into(),
            ..SessionSettings::default()
        });
        let token = theirs.issue("user-1", &TenantId::new("acme"), "admin").unwrap();

        assert!(ours.verify(&token).is_err());
        assert!(ours.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_issuer_checked() {
        let (strict, _) = verifier(SessionSettings {
            issuer: Some("tenantguard".into()),
            ..SessionSettings::default()
        });
        let (open, _) = verifier(SessionSettings::default());

        let token = open.issue("user-1", &TenantId::new("acme"), "admin").unwrap();
        assert!(strict.verify(&token).is_err());

        let token = strict.issue("user-1", &TenantId::new("acme"), "admin").unwrap();
        assert!(strict.verify(&token).is_ok());
    }
}
