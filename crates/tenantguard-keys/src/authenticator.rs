//! API Key Authenticator
//!
//! `authenticate` runs format check → prefix lookup → hash comparison →
//! expiry → rate limit. Last-used timestamps and audit rows are written by
//! detached tasks so neither can delay or fail the response.

use crate::format::{generate_secret, lookup_prefix, parse_bearer, validate_format};
use crate::hash::{HashConfig, KeyHasher};
use crate::ratelimit::{HourlyRateLimiter, RateLimitStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tenantguard_common::{
    ApiKey, ApiKeyStore, AuditEntry, AuditSink, Clock, GateError, GateResult, KeyEnvironment, SharedClock,
    TenantId,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Authenticator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub hash: HashConfig,
    /// Ceiling applied to keys issued without an explicit one
    pub default_rate_limit_per_hour: u32,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            hash: HashConfig::default(),
            default_rate_limit_per_hour: 1000,
        }
    }
}

/// Context attached to a request authenticated by API key
#[derive(Debug, Clone)]
pub struct AuthenticatedKey {
    pub key_id: Uuid,
    pub tenant_id: TenantId,
    pub scopes: Vec<String>,
    pub environment: KeyEnvironment,
    pub is_test: bool,
    pub is_sandbox: bool,
    pub rate: RateLimitStatus,
}

/// Parameters for a new key
#[derive(Debug, Clone, Deserialize)]
pub struct IssueKeyRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_environment")]
    pub environment: KeyEnvironment,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rate_limit_per_hour: Option<u32>,
}

fn default_environment() -> KeyEnvironment {
    KeyEnvironment::Live
}

/// Key metadata safe to return to a caller
#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    pub scopes: Vec<String>,
    pub environment: KeyEnvironment,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub rate_limit_per_hour: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&ApiKey> for KeySummary {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name.clone(),
            prefix: key.prefix.clone(),
            scopes: key.scopes.clone(),
            environment: key.environment,
            active: key.active,
            expires_at: key.expires_at,
            rate_limit_per_hour: key.rate_limit_per_hour,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

/// A freshly issued key. `secret` is never retrievable again.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedKey {
    #[serde(flatten)]
    pub summary: KeySummary,
    pub secret: String,
}

/// Validates bearer API keys and owns the hourly limiter
pub struct ApiKeyAuthenticator {
    keys: Arc<dyn ApiKeyStore>,
    audit: Arc<dyn AuditSink>,
    hasher: KeyHasher,
    limiter: HourlyRateLimiter,
    clock: SharedClock,
    default_rate_limit: u32,
}

impl ApiKeyAuthenticator {
    pub fn new(
        keys: Arc<dyn ApiKeyStore>,
        audit: Arc<dyn AuditSink>,
        config: &KeyConfig,
        clock: SharedClock,
    ) -> GateResult<Self> {
        Ok(Self {
            keys,
            audit,
            hasher: KeyHasher::new(&config.hash)?,
            limiter: HourlyRateLimiter::new(clock.clone()),
            clock,
            default_rate_limit: config.default_rate_limit_per_hour,
        })
    }

    /// Authenticate an `Authorization` header value
    pub async fn authenticate(&self, authorization: Option<&str>) -> GateResult<AuthenticatedKey> {
        let token = parse_bearer(authorization)?;
        self.authenticate_token(token).await
    }

    /// Authenticate a raw key already taken from its header
    pub async fn authenticate_token(&self, token: &str) -> GateResult<AuthenticatedKey> {
        validate_format(token)?;
        let prefix = lookup_prefix(token);

        let candidates = self.keys.find_active_by_prefix(prefix).await?;
        let secret: Arc<str> = Arc::from(token);
        let mut matched = None;
        for candidate in candidates {
            if self
                .hasher
                .verify_async(secret.clone(), candidate.key_hash.clone())
                .await?
            {
                matched = Some(candidate);
                break;
            }
        }
        let Some(key) = matched else {
            debug!(prefix, "no active key matched");
            return Err(GateError::InvalidKey);
        };

        let now = self.clock.now();
        if key.is_expired(now) {
            debug!(key_id = %key.id, "expired key presented");
            return Err(GateError::KeyExpired);
        }

        let rate = self.limiter.check(key.id, key.rate_limit_per_hour);
        if !rate.allowed {
            info!(key_id = %key.id, tenant_id = %key.tenant_id, limit = rate.limit, "key rate limited");
            return Err(rate.exceeded());
        }

        self.spawn_touch(key.id, now);

        Ok(AuthenticatedKey {
            key_id: key.id,
            tenant_id: key.tenant_id,
            scopes: key.scopes,
            environment: key.environment,
            is_test: key.environment == KeyEnvironment::Test,
            is_sandbox: key.environment == KeyEnvironment::Sandbox,
            rate,
        })
    }

    fn spawn_touch(&self, key_id: Uuid, at: DateTime<Utc>) {
        let keys = self.keys.clone();
        tokio::spawn(async move {
            if let Err(e) = keys.touch_last_used(key_id, at).await {
                warn!(%key_id, error = %e, "failed to update key last_used_at");
            }
        });
    }

    /// Write the audit row for a completed request in the background
    pub fn spawn_audit(&self, key: &AuthenticatedKey, method: &str, path: &str, status: u16, latency: Duration) {
        let entry = AuditEntry {
            tenant_id: key.tenant_id.clone(),
            key_id: Some(key.key_id),
            method: method.to_string(),
            path: path.to_string(),
            status,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            at: self.clock.now(),
        };
        let audit = self.audit.clone();
        tokio::spawn(async move {
            if let Err(e) = audit.record(entry).await {
                warn!(error = %e, "failed to write api key audit row");
            }
        });
    }

    // =========================================================================
    // Key lifecycle
    // =========================================================================

    /// Create a key for `tenant_id`. The returned secret is the only copy.
    pub async fn issue_key(&self, tenant_id: &TenantId, request: IssueKeyRequest) -> GateResult<IssuedKey> {
        let secret = generate_secret(request.environment);
        let key_hash = self.hasher.hash_async(secret.clone()).await?;

        let key = ApiKey {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            name: request.name,
            prefix: lookup_prefix(&secret).to_string(),
            key_hash,
            scopes: request.scopes,
            environment: request.environment,
            active: true,
            expires_at: request.expires_at,
            rate_limit_per_hour: request.rate_limit_per_hour.unwrap_or(self.default_rate_limit),
            last_used_at: None,
            created_at: self.clock.now(),
        };
        self.keys.insert_key(key.clone()).await?;

        info!(tenant_id = %tenant_id, key_id = %key.id, prefix = %key.prefix, "issued api key");
        Ok(IssuedKey {
            summary: KeySummary::from(&key),
            secret,
        })
    }

    /// Deactivate a key owned by `tenant_id`. Returns false if no such active key.
    pub async fn revoke_key(&self, tenant_id: &TenantId, key_id: Uuid) -> GateResult<bool> {
        let revoked = self.keys.deactivate_key(tenant_id, key_id).await?;
        if revoked {
            info!(tenant_id = %tenant_id, %key_id, "revoked api key");
        }
        Ok(revoked)
    }

    pub async fn list_keys(&self, tenant_id: &TenantId) -> GateResult<Vec<KeySummary>> {
        let keys = self.keys.list_keys(tenant_id).await?;
        Ok(keys.iter().map(KeySummary::from).collect())
    }

    pub fn limiter(&self) -> &HourlyRateLimiter {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::{block_in_test_mode, require_scope};
    use chrono::TimeZone;
    use tenantguard_common::{ManualClock, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        auth: ApiKeyAuthenticator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 10, 15, 0).unwrap()));
        let config = KeyConfig {
            hash: HashConfig {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
                pepper: None,
            },
            default_rate_limit_per_hour: 3,
        };
        let auth = ApiKeyAuthenticator::new(store.clone(), store.clone(), &config, clock.clone()).unwrap();
        Fixture { store, clock, auth }
    }

    fn request(env: KeyEnvironment) -> IssueKeyRequest {
        IssueKeyRequest {
            name: "ci".into(),
            scopes: vec!["clients:read".into()],
            environment: env,
            expires_at: None,
            rate_limit_per_hour: None,
        }
    }

    #[tokio::test]
    async fn test_issue_then_authenticate() {
        let f = fixture();
        let tenant = TenantId::from("acme");
        let issued = f.auth.issue_key(&tenant, request(KeyEnvironment::Live)).await.unwrap();

        let stored = f.store.key(issued.summary.id).unwrap();
        assert_ne!(stored.key_hash, issued.secret);
        assert!(!stored.key_hash.contains(&issued.secret));

        let header = format!("Bearer {}", issued.secret);
        let key = f.auth.authenticate(Some(&header)).await.unwrap();
        assert_eq!(key.tenant_id, tenant);
        assert_eq!(key.scopes, vec!["clients:read".to_string()]);
        assert!(!key.is_test && !key.is_sandbox);
        assert_eq!(key.rate.limit, 3);
        assert_eq!(key.rate.remaining, 2);
    }

    #[tokio::test]
    async fn test_failure_codes() {
        let f = fixture();
        let tenant = TenantId::from("acme");
        let issued = f.auth.issue_key(&tenant, request(KeyEnvironment::Live)).await.unwrap();

        let err = f.auth.authenticate(None).await.unwrap_err();
        assert_eq!(err.code(), "unauthorized");

        let err = f.auth.authenticate(Some("Bearer nxk_live_short")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_key_format");

        // Same lookup prefix, different secret
        let mut forged = issued.secret.clone();
        forged.pop();
        forged.push(if issued.secret.ends_with('x') { 'y' } else { 'x' });
        let err = f.auth.authenticate_token(&forged).await.unwrap_err();
        assert_eq!(err.code(), "invalid_key");

        assert!(f.auth.revoke_key(&tenant, issued.summary.id).await.unwrap());
        let err = f.auth.authenticate_token(&issued.secret).await.unwrap_err();
        assert_eq!(err.code(), "invalid_key");
    }

    #[tokio::test]
    async fn test_expired_key() {
        let f = fixture();
        let mut req = request(KeyEnvironment::Live);
        req.expires_at = Some(f.clock.now() + chrono::Duration::minutes(5));
        let issued = f.auth.issue_key(&"acme".into(), req).await.unwrap();

        assert!(f.auth.authenticate_token(&issued.secret).await.is_ok());
        f.clock.advance(chrono::Duration::minutes(5));
        let err = f.auth.authenticate_token(&issued.secret).await.unwrap_err();
        assert_eq!(err.code(), "key_expired");
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let f = fixture();
        let issued = f.auth.issue_key(&"acme".into(), request(KeyEnvironment::Live)).await.unwrap();

        for _ in 0..3 {
            f.auth.authenticate_token(&issued.secret).await.unwrap();
        }
        let err = f.auth.authenticate_token(&issued.secret).await.unwrap_err();
        assert_eq!(err.status(), 429);
        let GateError::RateLimitExceeded { retry_after_secs, .. } = err else {
            panic!("expected a rate limit denial");
        };
        assert_eq!(retry_after_secs, 45 * 60);

        f.clock.advance(chrono::Duration::minutes(45));
        assert!(f.auth.authenticate_token(&issued.secret).await.is_ok());
    }

    #[tokio::test]
    async fn test_test_mode_and_scopes() {
        let f = fixture();
        let issued = f.auth.issue_key(&"acme".into(), request(KeyEnvironment::Test)).await.unwrap();
        let key = f.auth.authenticate_token(&issued.secret).await.unwrap();

        assert!(key.is_test);
        assert_eq!(block_in_test_mode(&key).unwrap_err().code(), "test_mode_blocked");
        assert!(require_scope(&key, &["clients:read"]).is_ok());
        let err = require_scope(&key, &["keys:write"]).unwrap_err();
        assert_eq!(err.code(), "insufficient_scope");
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn test_background_writes() {
        let f = fixture();
        let issued = f.auth.issue_key(&"acme".into(), request(KeyEnvironment::Live)).await.unwrap();
        let key = f.auth.authenticate_token(&issued.secret).await.unwrap();
        f.auth.spawn_audit(&key, "GET", "/api/v1/usage", 200, Duration::from_millis(12));

        for _ in 0..50 {
            if f.store.key(key.key_id).unwrap().last_used_at.is_some() && !f.store.audit_entries().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.store.key(key.key_id).unwrap().last_used_at, Some(f.clock.now()));
        let audit = f.store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].key_id, Some(key.key_id));
        assert_eq!(audit[0].latency_ms, 12);
    }

    #[tokio::test]
    async fn test_list_never_exposes_secrets() {
        let f = fixture();
        let tenant = TenantId::from("acme");
        f.auth.issue_key(&tenant, request(KeyEnvironment::Live)).await.unwrap();
        f.auth.issue_key(&"globex".into(), request(KeyEnvironment::Live)).await.unwrap();

        let listed = f.auth.list_keys(&tenant).await.unwrap();
        assert_eq!(listed.len(), 1);
        let json = serde_json::to_value(&listed[0]).unwrap();
        assert!(json.get("key_hash").is_none());
        assert!(json.get("secret").is_none());
    }
}
