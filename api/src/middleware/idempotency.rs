//! Idempotency stage
//!
//! Wraps the handler: replays a stored response for a seen key, otherwise
//! runs the handler under the `(key, tenant)` lock and stores a 2xx
//! response before releasing it.

use crate::error::ApiError;
use crate::state::SharedState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tenantguard_common::{GateError, GateResult, IdempotencyRecord};
use tenantguard_idempotency::{original_timestamp, resolve_key, Begin, IDEMPOTENCY_KEY_HEADER};
use tenantguard_tenant::TenantContext;
use tracing::warn;

pub const IDEMPOTENT_REPLAYED: HeaderName = HeaderName::from_static("idempotent-replayed");
pub const IDEMPOTENCY_ORIGINAL_TIMESTAMP: HeaderName = HeaderName::from_static("idempotency-original-timestamp");

/// Rebuild the stored response verbatim, plus the replay markers
fn replay(record: &IdempotencyRecord) -> Response {
    let status = StatusCode::from_u16(record.response_status).unwrap_or(StatusCode::OK);
    let mut response = (status, record.response_body.clone()).into_response();
    let headers = response.headers_mut();
    match record
        .response_content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        Some(content_type) => {
            headers.insert(CONTENT_TYPE, content_type);
        }
        None => {
            headers.remove(CONTENT_TYPE);
        }
    }
    headers.insert(IDEMPOTENT_REPLAYED, HeaderValue::from_static("true"));
    if let Ok(at) = HeaderValue::from_str(&original_timestamp(record)) {
        headers.insert(IDEMPOTENCY_ORIGINAL_TIMESTAMP, at);
    }
    response
}

async fn run(state: &SharedState, request: Request, next: Next) -> GateResult<Response> {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    if !state.idempotency.applies(&method, &path) {
        return Ok(next.run(request).await);
    }

    let tenant = request
        .extensions()
        .get::<TenantContext>()
        .cloned()
        .ok_or(GateError::TenantRequired)?;
    let supplied = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|v| v.to_str().map(str::to_string))
        .transpose()
        .map_err(|_| GateError::InvalidRequestBody("Idempotency-Key must be visible ASCII".into()))?;

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, state.body_limit)
        .await
        .map_err(|_| GateError::InvalidRequestBody(format!("body exceeds {} bytes", state.body_limit)))?;
    let key = resolve_key(supplied.as_deref(), &method, &path, &body)?;

    let permit = match state
        .idempotency
        .begin(tenant.tenant_id(), &key, &method, &path, &body)
        .await?
    {
        Begin::Replay(record) => return Ok(replay(&record)),
        Begin::Proceed(permit) => permit,
    };

    let response = next.run(Request::from_parts(parts, Body::from(body))).await;
    let (parts, body) = response.into_parts();
    let body = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GateError::Internal(format!("failed to buffer response: {e}")))?;

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Err(e) = permit
        .complete(parts.status.as_u16(), content_type, body.to_vec())
        .await
    {
        // The side effect already happened; a retry will execute again
        warn!(key = %key, tenant_id = %tenant.tenant_id(), error = %e, "failed to store idempotent response");
    }

    Ok(Response::from_parts(parts, Body::from(body)))
}

pub async fn idempotent(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    match run(&state, request, next).await {
        Ok(response) => response,
        Err(e) => ApiError(e).into_response(),
    }
}
