//! Usage summary endpoint

use crate::error::ApiResult;
use crate::extract::Tenant;
use crate::middleware::{gated, Gate};
use crate::models::*;
use crate::state::SharedState;
use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use std::sync::Arc;
use tenantguard_entitlements::TenantConfig;

pub fn router(state: &SharedState) -> Router<SharedState> {
    Router::new().route("/api/v1/usage", gated(state, Gate::new().module("dashboard"), get(usage_summary)))
}

/// Quota status of every resource for the caller's tenant
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    responses(
        (status = 200, description = "Usage per resource", body = UsageResponse),
        (status = 403, description = "Subscription inactive", body = ErrorBody)
    ),
    tag = "usage"
)]
pub async fn usage_summary(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Extension(config): Extension<Arc<TenantConfig>>,
) -> ApiResult<Json<UsageResponse>> {
    let plan = config.plan.as_ref();
    let quotas = state.quotas.summary(tenant.tenant_id(), plan).await;
    Ok(Json(UsageResponse {
        tenant_id: tenant.tenant_id().to_string(),
        plan: plan.map(|p| p.tier.as_str().to_string()),
        quotas: quotas.into_iter().map(UsageEntry::from).collect(),
    }))
}
