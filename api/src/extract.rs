//! Request extensions and the extractors handlers read them through

use crate::auth::Claims;
use crate::error::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use parking_lot::Mutex;
use std::sync::Arc;
use tenantguard_common::{GateError, GateResult, TenantId};
use tenantguard_entitlements::UsageTicket;
use tenantguard_keys::{has_any_scope, require_scope, AuthenticatedKey};
use tenantguard_tenant::{AuthSource, TenantContext};

/// Who authenticated the request
#[derive(Debug, Clone)]
pub enum Principal {
    ApiKey(AuthenticatedKey),
    Session(Claims),
}

impl Principal {
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Self::ApiKey(key) => &key.tenant_id,
            Self::Session(claims) => &claims.tenant_id,
        }
    }

    pub fn auth_source(&self) -> AuthSource {
        match self {
            Self::ApiKey(_) => AuthSource::ApiKey,
            Self::Session(_) => AuthSource::Session,
        }
    }

    /// Sessions carry their role as the only scope, so an `admin` session
    /// passes every scope check.
    pub fn require_scope(&self, required: &[&str]) -> GateResult<()> {
        match self {
            Self::ApiKey(key) => require_scope(key, required),
            Self::Session(claims) if has_any_scope(&[claims.role.as_str()], required) => Ok(()),
            Self::Session(_) => Err(GateError::InsufficientScope {
                required: required.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

/// Holds the quota ticket between the quota stage and the handler
#[derive(Debug, Clone)]
pub struct UsageSlot(Arc<Mutex<Option<UsageTicket>>>);

impl UsageSlot {
    pub fn new(ticket: UsageTicket) -> Self {
        Self(Arc::new(Mutex::new(Some(ticket))))
    }

    pub fn take(&self) -> Option<UsageTicket> {
        self.0.lock().take()
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// Tenant bound by the shield. Rejects with `TENANT_REQUIRED` on exempt routes.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .map(Tenant)
            .ok_or(ApiError(GateError::TenantRequired))
    }
}

/// Authenticated principal
#[derive(Debug, Clone)]
pub struct Auth(pub Principal);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Auth)
            .ok_or(ApiError(GateError::Unauthenticated))
    }
}

/// Quota ticket reserved for this request, if the route is quota-gated.
/// Call `increment_usage` once the operation has succeeded.
#[derive(Debug)]
pub struct Usage(pub Option<UsageTicket>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Usage {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Usage(parts.extensions.get::<UsageSlot>().and_then(UsageSlot::take)))
    }
}
