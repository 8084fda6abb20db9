//! GateError → HTTP response
//!
//! Every denial leaves the server as
//! `{ "error": <code>, "message": <text>, ...context }`.

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use tenantguard_common::GateError;
use tenantguard_keys::RateLimitStatus;
use thiserror::Error;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// API error type
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub GateError);

/// Handler result
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Response body
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".into(), Value::from(self.0.code()));
        body.insert("message".into(), Value::from(self.0.message()));
        body.extend(self.0.context());
        Value::Object(body)
    }
}

/// Write the rate-limit headers every key-authenticated response carries
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, rate: &RateLimitStatus) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(rate.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(rate.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(rate.reset_at));
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_internal() {
            tracing::error!(error = %self.0, "request failed");
        }

        let mut response = (self.status_code(), Json(self.body())).into_response();

        if let GateError::RateLimitExceeded {
            limit,
            reset_at,
            retry_after_secs,
        } = &self.0
        {
            let headers = response.headers_mut();
            headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            insert_rate_limit_headers(
                headers,
                &RateLimitStatus {
                    limit: *limit,
                    remaining: 0,
                    reset_at: *reset_at,
                    allowed: false,
                    retry_after_secs: *retry_after_secs,
                },
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenantguard_common::{ResourceKind, TenantId};

    #[test]
    fn test_body_shape() {
        let err = ApiError(GateError::TenantMismatch {
            expected: TenantId::new("acme"),
            found: TenantId::new("globex"),
        });
        let body = err.body();
        assert_eq!(body["error"], "TENANT_MISMATCH");
        assert!(body["message"].is_string());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_context_fields_are_flattened() {
        let err = ApiError(GateError::QuotaExceeded {
            resource: ResourceKind::AiPosts,
            current: 30,
            limit: 30,
        });
        let body = err.body();
        assert_eq!(body["error"], "QUOTA_EXCEEDED");
        assert_eq!(body["resource"], "ai_posts");
        assert_eq!(body["limit"], 30);
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_rate_limit_headers() {
        let response = ApiError(GateError::RateLimitExceeded {
            limit: 100,
            reset_at: 1_780_311_600,
            retry_after_secs: 42,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["retry-after"], "42");
        assert_eq!(headers["x-ratelimit-limit"], "100");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "1780311600");
    }

    #[test]
    fn test_internal_detail_hidden() {
        let body = ApiError(GateError::Internal("pool exhausted".into())).body();
        assert_eq!(body["error"], "INTERNAL_ERROR");
        assert!(!body["message"].as_str().unwrap().contains("pool"));
    }
}
