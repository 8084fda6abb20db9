//! API key management endpoints

use crate::error::ApiResult;
use crate::extract::Tenant;
use crate::middleware::{gated, Gate};
use crate::models::*;
use crate::state::SharedState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use uuid::Uuid;

pub fn router(state: &SharedState) -> Router<SharedState> {
    let write = || Gate::new().scopes(&["keys:write"]);

    // Key creation stays out of the idempotency store: a stored response
    // would keep the cleartext secret and hand it out again on replay.
    Router::new()
        .route(
            "/api/v1/api-keys",
            gated(state, write().block_test_mode(), post(create_api_key))
                .merge(gated(state, Gate::new().scopes(&["keys:read", "keys:write"]), get(list_api_keys))),
        )
        .route("/api/v1/api-keys/:id", gated(state, write(), delete(revoke_api_key)))
}

/// Issue a key. The secret is only ever returned here.
#[utoipa::path(
    post,
    path = "/api/v1/api-keys",
    request_body = ApiKeyCreate,
    responses(
        (status = 201, description = "Key issued", body = ApiKeyCreated),
        (status = 403, description = "Missing scope or test-mode key", body = ErrorBody)
    ),
    tag = "api-keys"
)]
pub async fn create_api_key(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Json(input): Json<ApiKeyCreate>,
) -> ApiResult<(StatusCode, Json<ApiKeyCreated>)> {
    let issued = state.keys.issue_key(tenant.tenant_id(), input.into()).await?;
    Ok((StatusCode::CREATED, Json(issued.into())))
}

/// Keys of the caller's tenant
#[utoipa::path(
    get,
    path = "/api/v1/api-keys",
    responses(
        (status = 200, description = "Keys without secrets", body = [ApiKeyView])
    ),
    tag = "api-keys"
)]
pub async fn list_api_keys(State(state): State<SharedState>, Tenant(tenant): Tenant) -> ApiResult<Json<Vec<ApiKeyView>>> {
    let keys = state.keys.list_keys(tenant.tenant_id()).await?;
    Ok(Json(keys.into_iter().map(ApiKeyView::from).collect()))
}

/// Deactivate a key owned by the caller's tenant
#[utoipa::path(
    delete,
    path = "/api/v1/api-keys/{id}",
    params(("id" = Uuid, Path, description = "Key id")),
    responses(
        (status = 200, description = "Whether a key was deactivated", body = RevokeResponse)
    ),
    tag = "api-keys"
)]
pub async fn revoke_api_key(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RevokeResponse>> {
    let revoked = state.keys.revoke_key(tenant.tenant_id(), id).await?;
    Ok(Json(RevokeResponse { revoked }))
}
