//! Error taxonomy
//!
//! [`GateError`] is the single denial type every stage returns. Each variant
//! carries a stable wire code, an HTTP status and the context fields the
//! response body exposes next to `error` and `message`.

use crate::model::{PlanTier, ResourceKind, TenantId};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint or conflict target already taken
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything the backend itself reports
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Storage result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Terminal denial produced by a pipeline stage
#[derive(Debug, Clone, Error)]
pub enum GateError {
    // Tenant shield
    /// `TENANT_REQUIRED`
    #[error("this route requires an authenticated tenant")]
    TenantRequired,

    /// `TENANT_MISMATCH`
    #[error("tenant id does not match the authenticated tenant")]
    TenantMismatch {
        /// Authenticated tenant
        expected: TenantId,
        /// Tenant named by the request
        found: TenantId,
    },

    /// `TENANT_NOT_FOUND`
    #[error("tenant {0} not found")]
    TenantNotFound(TenantId),

    /// No principal on a route that needs one
    #[error("authentication required")]
    Unauthenticated,

    // API keys
    /// `unauthorized`
    #[error("missing or malformed Authorization header")]
    Unauthorized,

    /// `invalid_key_format`
    #[error("API key format is invalid")]
    InvalidKeyFormat,

    /// `invalid_key`
    #[error("API key is invalid or revoked")]
    InvalidKey,

    /// `key_expired`
    #[error("API key has expired")]
    KeyExpired,

    /// `insufficient_scope`
    #[error("API key lacks the required scope")]
    InsufficientScope {
        /// Any one of these would have passed
        required: Vec<String>,
    },

    /// `test_mode_blocked`
    #[error("this route is not available to test-mode keys")]
    TestModeBlocked,

    /// `rate_limit_exceeded`
    #[error("rate limit of {limit} requests per hour exceeded")]
    RateLimitExceeded {
        /// Hourly ceiling of the key
        limit: u32,
        /// Unix seconds at which the window resets
        reset_at: i64,
        /// Seconds until the reset
        retry_after_secs: u64,
    },

    // Entitlements
    /// `MODULE_NOT_ACTIVATED`
    #[error("module {module} is not activated for this tenant")]
    ModuleNotActivated {
        /// Module id as requested
        module: String,
        /// Where the tenant can turn the module on
        upgrade_hint: String,
    },

    /// `MODULE_NOT_INCLUDED`, from the static plan hierarchy
    #[error("module {module} requires the {required_plan} plan")]
    ModuleNotIncluded {
        /// Module id as requested
        module: String,
        /// Tenant's plan, if any
        current_plan: Option<PlanTier>,
        /// Lowest tier that includes the module
        required_plan: PlanTier,
    },

    /// `QUOTA_EXCEEDED`
    #[error("quota exceeded for {resource}: {current}/{limit}")]
    QuotaExceeded {
        /// Resource under quota
        resource: ResourceKind,
        /// Usage the check was made against
        current: u64,
        /// Plan ceiling
        limit: u64,
    },

    /// `SUBSCRIPTION_SUSPENDED`
    #[error("subscription is suspended")]
    SubscriptionSuspended,

    /// `SUBSCRIPTION_EXPIRED`
    #[error("subscription has expired")]
    SubscriptionExpired,

    /// `TRIAL_EXPIRED`
    #[error("trial ended at {ended_at}")]
    TrialExpired {
        /// End of the trial
        ended_at: DateTime<Utc>,
    },

    // Idempotency
    /// `IDEMPOTENCY_KEY_REUSED`
    #[error("idempotency key was already used for a different request")]
    IdempotencyKeyReused,

    /// `INVALID_REQUEST_BODY`
    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),

    /// Bug-class failure, logged and reported as 500
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            Self::TenantRequired => "TENANT_REQUIRED",
            Self::TenantMismatch { .. } => "TENANT_MISMATCH",
            Self::TenantNotFound(_) => "TENANT_NOT_FOUND",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Unauthorized => "unauthorized",
            Self::InvalidKeyFormat => "invalid_key_format",
            Self::InvalidKey => "invalid_key",
            Self::KeyExpired => "key_expired",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::TestModeBlocked => "test_mode_blocked",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::ModuleNotActivated { .. } => "MODULE_NOT_ACTIVATED",
            Self::ModuleNotIncluded { .. } => "MODULE_NOT_INCLUDED",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::SubscriptionSuspended => "SUBSCRIPTION_SUSPENDED",
            Self::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
            Self::TrialExpired { .. } => "TRIAL_EXPIRED",
            Self::IdempotencyKeyReused => "IDEMPOTENCY_KEY_REUSED",
            Self::InvalidRequestBody(_) => "INVALID_REQUEST_BODY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthenticated
            | Self::Unauthorized
            | Self::InvalidKeyFormat
            | Self::InvalidKey
            | Self::KeyExpired => 401,
            Self::TenantRequired
            | Self::TenantMismatch { .. }
            | Self::InsufficientScope { .. }
            | Self::TestModeBlocked
            | Self::ModuleNotActivated { .. }
            | Self::ModuleNotIncluded { .. }
            | Self::SubscriptionSuspended
            | Self::SubscriptionExpired
            | Self::TrialExpired { .. } => 403,
            Self::QuotaExceeded { .. } => 402,
            Self::TenantNotFound(_) => 404,
            Self::InvalidRequestBody(_) => 400,
            Self::IdempotencyKeyReused => 422,
            Self::RateLimitExceeded { .. } => 429,
            Self::Internal(_) => 500,
        }
    }

    /// Human readable message. Internal details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    /// Extra body fields for this denial
    pub fn context(&self) -> Map<String, Value> {
        let value = match self {
            Self::InsufficientScope { required } => json!({ "required_scopes": required }),
            Self::RateLimitExceeded {
                limit,
                reset_at,
                retry_after_secs,
            } => json!({
                "limit": limit,
                "reset_at": reset_at,
                "retry_after": retry_after_secs,
            }),
            Self::ModuleNotActivated {
                module,
                upgrade_hint,
            } => json!({ "module": module, "upgrade": upgrade_hint }),
            Self::ModuleNotIncluded {
                module,
                current_plan,
                required_plan,
            } => json!({
                "module": module,
                "current_plan": current_plan,
                "required_plan": required_plan,
                "upgrade": "/billing/upgrade",
            }),
            Self::QuotaExceeded {
                resource,
                current,
                limit,
            } => json!({
                "resource": resource.as_str(),
                "current": current,
                "limit": limit,
                "upgrade": "/billing/upgrade",
            }),
            Self::SubscriptionSuspended | Self::SubscriptionExpired => {
                json!({ "billing": "/billing" })
            }
            Self::TrialExpired { ended_at } => {
                json!({ "trial_ended_at": ended_at.to_rfc3339(), "billing": "/billing" })
            }
            _ => Value::Null,
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Whether this is a server-side fault rather than a denial
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<StoreError> for GateError {
    fn from(e: StoreError) -> Self {
        GateError::Internal(e.to_string())
    }
}

/// Result type for pipeline stages
pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        assert_eq!(GateError::TenantRequired.code(), "TENANT_REQUIRED");
        assert_eq!(GateError::TenantRequired.status(), 403);
        assert_eq!(GateError::TestModeBlocked.code(), "test_mode_blocked");
        assert_eq!(GateError::InvalidKeyFormat.status(), 401);
        assert_eq!(
            GateError::QuotaExceeded {
                resource: ResourceKind::Clients,
                current: 1000,
                limit: 1000
            }
            .status(),
            402
        );
    }

    #[test]
    fn test_quota_context_fields() {
        let err = GateError::QuotaExceeded {
            resource: ResourceKind::Clients,
            current: 10,
            limit: 10,
        };
        let ctx = err.context();
        assert_eq!(ctx["resource"], "clients");
        assert_eq!(ctx["current"], 10);
        assert_eq!(ctx["limit"], 10);
        assert!(ctx.contains_key("upgrade"));
    }

    #[test]
    fn test_internal_message_is_opaque() {
        let err: GateError = StoreError::Backend("connection reset by peer".into()).into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(!err.message().contains("connection reset"));
    }
}
