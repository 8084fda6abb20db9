//! TenantGuard HTTP API
//!
//! The access layer as an axum middleware pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          REQUEST PIPELINE                            │
//! │                                                                      │
//! │  resolve_tenant   header* | query* | custom domain | subdomain       │
//! │        │          (* only where configured)                          │
//! │        ▼                                                             │
//! │  authenticate     nxk_* bearer → API key   │   other bearer → JWT    │
//! │        │          X-RateLimit-* on every key response                │
//! │        ▼                                                             │
//! │  tenant_shield    TENANT_REQUIRED | TENANT_MISMATCH | body scoping   │
//! │        │          X-Tenant-Shield: active                            │
//! │        ▼                                                             │
//! │  gated(route)     scope → test mode → module → quota → idempotency   │
//! │        │                                                             │
//! │        ▼                                                             │
//! │     handler       Tenant / Usage extractors                          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

pub use config::Settings;
pub use error::{ApiError, ApiResult};
pub use extract::{Auth, Principal, Tenant, Usage};
pub use middleware::{gated, Gate};
pub use state::{AppState, SharedState, Stores};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "TenantGuard API",
        version = "0.1.0",
        description = "Multi-tenant access control: tenant isolation, API keys, module entitlements, quotas and idempotency",
        license(name = "Apache-2.0")
    ),
    paths(
        routes::health::health_check,
        routes::api_keys::create_api_key,
        routes::api_keys::list_api_keys,
        routes::api_keys::revoke_api_key,
        routes::usage::usage_summary,
        routes::cache::invalidate_cache,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            models::ErrorBody,
            models::ApiKeyCreate, models::ApiKeyView, models::ApiKeyCreated, models::RevokeResponse,
            models::UsageEntry, models::UsageResponse,
            models::CacheInvalidation, models::CacheInvalidated
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "api-keys", description = "API key lifecycle"),
        (name = "usage", description = "Quota usage"),
        (name = "cache", description = "Cache invalidation")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the API router
pub fn build_router(state: SharedState) -> Router {
    build_router_with(state, Router::new())
}

/// Build the API router with extra business routes behind the same pipeline.
/// Wrap each business route in [`gated`] to declare its stages.
pub fn build_router_with(state: SharedState, business: Router<SharedState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(routes::api_keys::router(&state))
        .merge(routes::usage::router(&state))
        .merge(routes::cache::router(&state))
        .merge(business)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), middleware::resolve_tenant))
                .layer(from_fn_with_state(state.clone(), middleware::authenticate))
                .layer(from_fn_with_state(state.clone(), middleware::tenant_shield)),
        )
        // Router layers added last run first
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
