//! Tenant resolution stage

use crate::error::ApiError;
use crate::state::SharedState;
use axum::{
    extract::{Query, Request, State},
    http::header::HOST,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tenantguard_tenant::ResolveRequest;

/// Header an upstream authenticated proxy may set
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Attach a [`tenantguard_tenant::Resolution`] to every request
pub async fn resolve_tenant(State(state): State<SharedState>, mut request: Request, next: Next) -> Response {
    let settings = &state.resolver_settings;

    let trusted = if settings.trust_tenant_header {
        request
            .headers()
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    } else {
        None
    };

    let query = if settings.query_allowed(request.uri().path()) {
        Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(mut params)| params.remove(&settings.query_param))
    } else {
        None
    };

    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_string);

    let lookup = ResolveRequest {
        trusted_header: trusted.as_deref(),
        query: query.as_deref(),
        host: host.as_deref(),
    };
    let resolution = match state.resolver.resolve(&lookup).await {
        Ok(resolution) => resolution,
        Err(e) => return ApiError(e).into_response(),
    };

    tracing::debug!(
        tenant_id = resolution.tenant_id.as_ref().map(|t| t.as_str()).unwrap_or("-"),
        source = resolution.source.as_str(),
        "tenant resolved"
    );
    request.extensions_mut().insert(resolution);
    next.run(request).await
}
