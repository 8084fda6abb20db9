//! Per-route gates
//!
//! [`gated`] wraps a route in the stages it declares, always in the same
//! order: scope → test mode → module → quota → idempotency → handler.

use super::idempotency::idempotent;
use crate::error::ApiError;
use crate::extract::{Principal, UsageSlot};
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use std::sync::Arc;
use tenantguard_common::{GateError, GateResult, ResourceKind};
use tenantguard_entitlements::TenantConfig;
use tenantguard_keys::block_in_test_mode;
use tenantguard_tenant::TenantContext;

/// Stages a route requires
#[derive(Debug, Clone, Default)]
pub struct Gate {
    scopes: Vec<&'static str>,
    block_test_mode: bool,
    module: Option<&'static str>,
    quota: Option<ResourceKind>,
    idempotent: bool,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any one of `scopes` (or `admin`) is required
    pub fn scopes(mut self, scopes: &[&'static str]) -> Self {
        self.scopes = scopes.to_vec();
        self
    }

    pub fn block_test_mode(mut self) -> Self {
        self.block_test_mode = true;
        self
    }

    pub fn module(mut self, module: &'static str) -> Self {
        self.module = Some(module);
        self
    }

    pub fn quota(mut self, resource: ResourceKind) -> Self {
        self.quota = Some(resource);
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }
}

#[derive(Clone)]
struct GateState {
    app: SharedState,
    gate: Arc<Gate>,
}

/// Wrap `route` in the stages `gate` declares
pub fn gated(state: &SharedState, gate: Gate, route: MethodRouter<SharedState>) -> MethodRouter<SharedState> {
    let route = if gate.idempotent {
        route.layer(from_fn_with_state(state.clone(), idempotent))
    } else {
        route
    };
    route.layer(from_fn_with_state(
        GateState {
            app: state.clone(),
            gate: Arc::new(gate),
        },
        enforce_gate,
    ))
}

fn incoming_bytes(request: &Request) -> u64 {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

async fn check(state: &GateState, request: &mut Request) -> GateResult<()> {
    let gate = &state.gate;
    let principal = request.extensions().get::<Principal>().cloned();
    let tenant = request.extensions().get::<TenantContext>().cloned();

    if !gate.scopes.is_empty() {
        principal
            .as_ref()
            .ok_or(GateError::Unauthenticated)?
            .require_scope(&gate.scopes)?;
    }

    if gate.block_test_mode {
        if let Some(Principal::ApiKey(key)) = &principal {
            block_in_test_mode(key)?;
        }
    }

    let tenant_id = tenant.as_ref().map(TenantContext::tenant_id);

    if let Some(module) = gate.module {
        let config = state.app.access.check_module(tenant_id, module).await?;
        request.extensions_mut().insert(config);
    }

    if let Some(resource) = gate.quota {
        let tenant_id = tenant_id.ok_or(GateError::Unauthenticated)?;
        let config = match request.extensions().get::<Arc<TenantConfig>>() {
            Some(config) => config.clone(),
            None => state.app.access.tenant_config(tenant_id).await?,
        };
        let (status, ticket) = state
            .app
            .quotas
            .enforce(tenant_id, config.plan.as_ref(), resource, incoming_bytes(request))
            .await?;
        tracing::debug!(
            tenant_id = %tenant_id,
            resource = %resource,
            current = status.current,
            percentage = status.percentage,
            "quota reserved"
        );
        request.extensions_mut().insert(UsageSlot::new(ticket));
    }

    Ok(())
}

async fn enforce_gate(State(state): State<GateState>, mut request: Request, next: Next) -> Response {
    match check(&state, &mut request).await {
        Ok(()) => next.run(request).await,
        Err(e) => ApiError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_builder() {
        let gate = Gate::new()
            .scopes(&["payments:write"])
            .block_test_mode()
            .module("invoicing")
            .quota(ResourceKind::Clients)
            .idempotent();
        assert_eq!(gate.scopes, vec!["payments:write"]);
        assert!(gate.block_test_mode);
        assert_eq!(gate.module, Some("invoicing"));
        assert_eq!(gate.quota, Some(ResourceKind::Clients));
        assert!(gate.idempotent);
    }

    #[test]
    fn test_incoming_bytes() {
        let request = Request::builder()
            .header(CONTENT_LENGTH, "2048")
            .body(Body::empty())
            .unwrap();
        assert_eq!(incoming_bytes(&request), 2048);
        assert_eq!(incoming_bytes(&Request::new(Body::empty())), 0);
    }
}
