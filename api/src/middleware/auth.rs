//! Authentication stage
//!
//! A bearer token carrying an API key prefix goes to the key
//! authenticator, anything else to the session verifier. Requests without
//! an `Authorization` header pass through unauthenticated and are left to
//! the shield.

use crate::error::{insert_rate_limit_headers, ApiError};
use crate::extract::Principal;
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tenantguard_common::{GateError, GateResult};
use tenantguard_keys::{looks_like_api_key, parse_bearer};

enum Credential {
    ApiKey(String),
    Session(String),
}

fn read_credential(header: &axum::http::HeaderValue) -> GateResult<Credential> {
    let value = header.to_str().map_err(|_| GateError::Unauthorized)?;
    let token = parse_bearer(Some(value))?;
    Ok(if looks_like_api_key(token) {
        Credential::ApiKey(token.to_string())
    } else {
        Credential::Session(token.to_string())
    })
}

/// Attach a [`Principal`] when the request carries credentials
pub async fn authenticate(State(state): State<SharedState>, mut request: Request, next: Next) -> Response {
    let credential = match request.headers().get(AUTHORIZATION).map(read_credential) {
        None => return next.run(request).await,
        Some(Ok(credential)) => credential,
        Some(Err(e)) => return ApiError(e).into_response(),
    };

    match credential {
        Credential::Session(token) => match state.sessions.verify(&token) {
            Ok(claims) => {
                request.extensions_mut().insert(Principal::Session(claims));
                next.run(request).await
            }
            Err(e) => ApiError(e).into_response(),
        },
        Credential::ApiKey(token) => {
            let key = match state.keys.authenticate_token(&token).await {
                Ok(key) => key,
                Err(e) => return ApiError(e).into_response(),
            };

            let started = Instant::now();
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            request.extensions_mut().insert(Principal::ApiKey(key.clone()));

            let mut response = next.run(request).await;
            insert_rate_limit_headers(response.headers_mut(), &key.rate);
            state
                .keys
                .spawn_audit(&key, &method, &path, response.status().as_u16(), started.elapsed());
            response
        }
    }
}
