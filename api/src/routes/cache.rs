//! Cache invalidation endpoint
//!
//! Called after branding or entitlement writes so this instance stops
//! serving stale domain bindings and module configs before their TTL.

use crate::error::ApiResult;
use crate::extract::Tenant;
use crate::middleware::{gated, Gate};
use crate::models::*;
use crate::state::SharedState;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tenantguard_common::TenantId;
use tracing::info;

pub fn router(state: &SharedState) -> Router<SharedState> {
    Router::new().route(
        "/api/v1/cache/invalidate",
        gated(state, Gate::new().scopes(&["admin"]), post(invalidate_cache)),
    )
}

/// Drop cached domain bindings and module config of the caller's tenant
#[utoipa::path(
    post,
    path = "/api/v1/cache/invalidate",
    request_body = CacheInvalidation,
    responses(
        (status = 200, description = "Entries dropped", body = CacheInvalidated),
        (status = 403, description = "Not an admin, or another tenant named", body = ErrorBody)
    ),
    tag = "cache"
)]
pub async fn invalidate_cache(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Json(input): Json<CacheInvalidation>,
) -> ApiResult<Json<CacheInvalidated>> {
    let tenant_id = match input.tenant_id {
        Some(raw) => {
            let named = TenantId::new(raw);
            tenant.validate_tenant(&named)?;
            named
        }
        None => tenant.tenant_id().clone(),
    };

    let hostname_cleared = input
        .hostname
        .as_deref()
        .is_some_and(|host| state.resolver.invalidate_domain(host));
    let tenant_domains_cleared = state.resolver.invalidate_tenant(&tenant_id);
    let config_cleared = state.access.invalidate(&tenant_id);

    info!(
        tenant_id = %tenant_id,
        hostname = input.hostname.as_deref().unwrap_or("-"),
        tenant_domains_cleared,
        config_cleared,
        "caches invalidated"
    );
    Ok(Json(CacheInvalidated {
        hostname_cleared,
        tenant_domains_cleared,
        config_cleared,
    }))
}
