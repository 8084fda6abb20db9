//! Tenant shield stage

use crate::error::ApiError;
use crate::extract::Principal;
use crate::state::SharedState;
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderName, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tenantguard_common::{GateError, GateResult};
use tenantguard_tenant::{is_mutating, RequestAudit, Resolution, ShieldOutcome, TenantContext};

pub const X_TENANT_SHIELD: HeaderName = HeaderName::from_static("x-tenant-shield");

fn client_ip(request: &Request) -> Option<String> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn audit_of(request: &Request) -> RequestAudit {
    let headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));
    RequestAudit::new(request.method().as_str(), request.uri().path(), client_ip(request), headers)
}

/// Scope tenant ids in a mutating JSON body to the context tenant
async fn guard_body(state: &SharedState, context: &TenantContext, audit: &RequestAudit, request: Request) -> GateResult<Request> {
    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, state.body_limit)
        .await
        .map_err(|_| GateError::InvalidRequestBody(format!("body exceeds {} bytes", state.body_limit)))?;
    if bytes.is_empty() {
        return Ok(Request::from_parts(parts, Body::empty()));
    }

    let mut value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| GateError::InvalidRequestBody(e.to_string()))?;
    state.shield.guard_body(context, audit, &mut value)?;

    let scoped = serde_json::to_vec(&value).map_err(|e| GateError::Internal(e.to_string()))?;
    parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(scoped.len()));
    Ok(Request::from_parts(parts, Body::from(scoped)))
}

async fn shield(state: &SharedState, mut request: Request, next: Next) -> GateResult<Response> {
    let audit = audit_of(&request);
    let resolution = request
        .extensions()
        .get::<Resolution>()
        .cloned()
        .unwrap_or_else(Resolution::none);
    let principal = request.extensions().get::<Principal>();
    let outcome = state.shield.enforce(
        &audit,
        principal.map(|p| (p.tenant_id(), p.auth_source())),
        &resolution,
    )?;

    if let ShieldOutcome::Bound(context) = outcome {
        if is_mutating(request.method().as_str()) && is_json(&request) {
            request = guard_body(state, &context, &audit, request).await?;
        }
        request.extensions_mut().insert(context);
    }

    Ok(next.run(request).await)
}

/// Enforce an authenticated tenant on every non-exempt route
pub async fn tenant_shield(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let mut response = match shield(&state, request, next).await {
        Ok(response) => response,
        Err(e) => ApiError(e).into_response(),
    };
    response
        .headers_mut()
        .insert(X_TENANT_SHIELD, HeaderValue::from_static("active"));
    response
}
