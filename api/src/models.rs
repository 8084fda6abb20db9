//! API Models
//!
//! Wire shapes documented in the OpenAPI document. Library types are
//! converted into these at the edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenantguard_common::KeyEnvironment;
use tenantguard_entitlements::QuotaStatus;
use tenantguard_keys::{IssueKeyRequest, IssuedKey, KeySummary};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned by every denial
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error code
    pub error: String,
    pub message: String,
}

// ============ API keys ============

/// Key creation request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ApiKeyCreate {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// `live`, `test` or `sandbox`
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "live")]
    pub environment: Option<KeyEnvironment>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rate_limit_per_hour: Option<u32>,
}

impl From<ApiKeyCreate> for IssueKeyRequest {
    fn from(input: ApiKeyCreate) -> Self {
        IssueKeyRequest {
            name: input.name,
            scopes: input.scopes,
            environment: input.environment.unwrap_or(KeyEnvironment::Live),
            expires_at: input.expires_at,
            rate_limit_per_hour: input.rate_limit_per_hour,
        }
    }
}

/// Stored key, without its secret
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyView {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    pub scopes: Vec<String>,
    #[schema(value_type = String, example = "live")]
    pub environment: KeyEnvironment,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub rate_limit_per_hour: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<KeySummary> for ApiKeyView {
    fn from(key: KeySummary) -> Self {
        Self {
            id: key.id,
            name: key.name,
            prefix: key.prefix,
            scopes: key.scopes,
            environment: key.environment,
            active: key.active,
            expires_at: key.expires_at,
            rate_limit_per_hour: key.rate_limit_per_hour,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

/// Newly issued key. `secret` is shown exactly once.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyCreated {
    #[serde(flatten)]
    pub key: ApiKeyView,
    pub secret: String,
}

impl From<IssuedKey> for ApiKeyCreated {
    fn from(issued: IssuedKey) -> Self {
        Self {
            key: issued.summary.into(),
            secret: issued.secret,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    pub revoked: bool,
}

// ============ Usage ============

/// Quota status of one resource
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsageEntry {
    pub resource: String,
    pub ok: bool,
    pub current: u64,
    /// `-1` when unlimited
    pub limit: i64,
    pub percentage: f64,
    pub warning: Option<String>,
}

impl From<QuotaStatus> for UsageEntry {
    fn from(status: QuotaStatus) -> Self {
        Self {
            resource: status.resource.as_str().to_string(),
            ok: status.ok,
            current: status.current,
            limit: i64::from(status.limit),
            percentage: status.percentage,
            warning: status.warning,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsageResponse {
    pub tenant_id: String,
    pub plan: Option<String>,
    pub quotas: Vec<UsageEntry>,
}

// ============ Cache ============

/// Cache invalidation request. Empty fields invalidate the caller's tenant.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CacheInvalidation {
    pub hostname: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheInvalidated {
    /// Whether the named hostname had a cache entry
    pub hostname_cleared: bool,
    /// Domain entries dropped for the tenant
    pub tenant_domains_cleared: usize,
    /// Whether a cached module config was dropped
    pub config_cleared: bool,
}
