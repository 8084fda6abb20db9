//! Tenant Shield
//!
//! Every non-allowlisted request must carry a tenant taken from an
//! authenticated source (session claim or API key record). A tenant that was
//! only named by header, query or host is not enough.
//!
//! Handlers receive a [`TenantContext`] and must call
//! [`TenantContext::validate_tenant`] before touching tenant-scoped data.

use crate::resolver::Resolution;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenantguard_common::{
    ApiKey, AuditEntry, GateError, GateResult, IdempotencyRecord, ResourceRow, TenantId, UsageCounter,
};
use tracing::warn;

const AUDIT_TARGET: &str = "tenantguard::audit";

/// Body keys that carry a tenant id
const BODY_TENANT_KEYS: [&str; 2] = ["tenant_id", "tenantId"];

/// Headers never written to the audit log
const REDACTED_HEADERS: [&str; 4] = ["authorization", "cookie", "x-api-key", "idempotency-key"];

/// Shield configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Path prefixes exempt from the tenant requirement
    pub allowlist: Vec<String>,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            allowlist: [
                "/health",
                "/api-docs",
                "/api/v1/auth",
                "/api/v1/signup",
                "/api/v1/webhooks",
                "/api/v1/public",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// How the tenant was authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    /// Bearer API key
    ApiKey,
    /// Session token
    Session,
}

/// Anything that belongs to exactly one tenant
pub trait TenantScoped {
    /// Owning tenant
    fn tenant_id(&self) -> &TenantId;
}

impl TenantScoped for TenantId {
    fn tenant_id(&self) -> &TenantId {
        self
    }
}

impl TenantScoped for ApiKey {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for ResourceRow {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for UsageCounter {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for IdempotencyRecord {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl TenantScoped for AuditEntry {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

/// Authenticated tenant bound to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    source: AuthSource,
}

impl TenantContext {
    /// Bind a request to `tenant_id`
    pub fn new(tenant_id: TenantId, source: AuthSource) -> Self {
        Self { tenant_id, source }
    }

    /// Bound tenant
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// How the tenant was authenticated
    pub fn source(&self) -> AuthSource {
        self.source
    }

    /// Fails unless `candidate` is the context tenant
    pub fn validate_tenant(&self, candidate: &TenantId) -> GateResult<()> {
        if candidate == &self.tenant_id {
            Ok(())
        } else {
            Err(GateError::TenantMismatch {
                expected: self.tenant_id.clone(),
                found: candidate.clone(),
            })
        }
    }

    /// Fails unless `item` belongs to the context tenant
    pub fn validate_owned<T: TenantScoped + ?Sized>(&self, item: &T) -> GateResult<()> {
        self.validate_tenant(item.tenant_id())
    }

    /// Check tenant ids embedded in a JSON body and fill them in when absent.
    ///
    /// Objects are checked at the top level; arrays are checked element-wise.
    /// Other JSON values pass through untouched.
    pub fn scope_body(&self, body: &mut Value) -> GateResult<()> {
        match body {
            Value::Object(map) => {
                let mut present = false;
                for key in BODY_TENANT_KEYS {
                    match map.get(key) {
                        None | Some(Value::Null) => {}
                        Some(Value::String(found)) => {
                            self.validate_tenant(&TenantId::new(found.as_str()))?;
                            present = true;
                        }
                        Some(other) => {
                            return Err(GateError::TenantMismatch {
                                expected: self.tenant_id.clone(),
                                found: TenantId::new(other.to_string()),
                            });
                        }
                    }
                }
                if !present {
                    map.insert(
                        BODY_TENANT_KEYS[0].to_string(),
                        Value::String(self.tenant_id.as_str().to_string()),
                    );
                }
                Ok(())
            }
            Value::Array(items) => items.iter_mut().try_for_each(|item| {
                if item.is_object() {
                    self.scope_body(item)
                } else {
                    Ok(())
                }
            }),
            _ => Ok(()),
        }
    }
}

/// Request facts recorded with every shield violation
#[derive(Debug, Clone)]
pub struct RequestAudit {
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Client address, if known
    pub client_ip: Option<String>,
    /// Headers with credentials redacted
    pub headers: Vec<(String, String)>,
}

impl RequestAudit {
    /// Capture request facts, redacting credentials
    pub fn new<'a, I>(method: &str, path: &str, client_ip: Option<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| {
                let name = name.to_ascii_lowercase();
                let value = if REDACTED_HEADERS.contains(&name.as_str()) {
                    "[redacted]".to_string()
                } else {
                    value.to_string()
                };
                (name, value)
            })
            .collect();
        Self {
            method: method.to_string(),
            path: path.to_string(),
            client_ip,
            headers,
        }
    }

    fn log_violation(&self, error: &GateError, detail: &str) {
        warn!(
            target: AUDIT_TARGET,
            code = error.code(),
            method = %self.method,
            path = %self.path,
            ip = self.client_ip.as_deref().unwrap_or("unknown"),
            headers = ?self.headers,
            "tenant shield violation: {detail}"
        );
    }
}

/// Result of shield enforcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShieldOutcome {
    /// Allowlisted route reached without an authenticated tenant
    Exempt,
    /// Request bound to an authenticated tenant
    Bound(TenantContext),
}

/// Tenant isolation enforcement point
#[derive(Debug, Clone, Default)]
pub struct TenantShield {
    config: ShieldConfig,
}

impl TenantShield {
    /// Shield over `config`
    pub fn new(config: ShieldConfig) -> Self {
        Self { config }
    }

    /// Whether `path` falls under an allowlisted prefix
    pub fn is_exempt(&self, path: &str) -> bool {
        self.config.allowlist.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Bind the request to its authenticated tenant or deny it.
    ///
    /// Violations are logged before the denial is returned.
    pub fn enforce(
        &self,
        request: &RequestAudit,
        authenticated: Option<(&TenantId, AuthSource)>,
        resolved: &Resolution,
    ) -> GateResult<ShieldOutcome> {
        let Some((tenant_id, source)) = authenticated else {
            if self.is_exempt(&request.path) {
                return Ok(ShieldOutcome::Exempt);
            }
            let err = GateError::TenantRequired;
            let detail = match &resolved.tenant_id {
                Some(claimed) => format!(
                    "unauthenticated request named tenant {claimed} via {}",
                    resolved.source.as_str()
                ),
                None => "no authenticated tenant".to_string(),
            };
            request.log_violation(&err, &detail);
            return Err(err);
        };

        let context = TenantContext::new(tenant_id.clone(), source);

        // A tenant's key must not be used on another tenant's domain
        if resolved.source.is_host_based() {
            if let Some(host_tenant) = &resolved.tenant_id {
                if let Err(err) = context.validate_tenant(host_tenant) {
                    request.log_violation(
                        &err,
                        &format!("tenant {tenant_id} used host bound to {host_tenant}"),
                    );
                    return Err(err);
                }
            }
        }

        Ok(ShieldOutcome::Bound(context))
    }

    /// Body guard for mutating requests
    pub fn guard_body(&self, context: &TenantContext, request: &RequestAudit, body: &mut Value) -> GateResult<()> {
        context.scope_body(body).inspect_err(|err| {
            request.log_violation(
                err,
                &format!("cross-tenant body injection against {}", context.tenant_id()),
            );
        })
    }
}

/// Methods whose bodies the guard inspects
pub fn is_mutating(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TenantSource;
    use serde_json::json;

    fn audit(path: &str) -> RequestAudit {
        RequestAudit::new(
            "POST",
            path,
            Some("203.0.113.7".into()),
            [("Authorization", "Bearer secret"), ("User-Agent", "curl/8")],
        )
    }

    fn acme() -> TenantId {
        TenantId::from("acme")
    }

    #[test]
    fn test_missing_tenant_is_denied() {
        let shield = TenantShield::default();
        let err = shield
            .enforce(&audit("/api/v1/clients"), None, &Resolution::none())
            .unwrap_err();
        assert_eq!(err.code(), "TENANT_REQUIRED");
        assert_eq!(err.status(), 403);
    }

    #[test]
    fn test_header_resolution_is_not_authentication() {
        let shield = TenantShield::default();
        let resolved = Resolution {
            tenant_id: Some(acme()),
            source: TenantSource::Header,
            branding: None,
        };
        let err = shield.enforce(&audit("/api/v1/clients"), None, &resolved).unwrap_err();
        assert_eq!(err.code(), "TENANT_REQUIRED");
    }

    #[test]
    fn test_allowlist_prefixes() {
        let shield = TenantShield::default();
        assert!(shield.is_exempt("/health"));
        assert!(shield.is_exempt("/api/v1/webhooks/stripe"));
        assert!(!shield.is_exempt("/healthcheck-admin"));
        assert!(!shield.is_exempt("/api/v1/clients"));

        let outcome = shield
            .enforce(&audit("/api/v1/auth/login"), None, &Resolution::none())
            .unwrap();
        assert_eq!(outcome, ShieldOutcome::Exempt);
    }

    #[test]
    fn test_authenticated_tenant_is_bound() {
        let shield = TenantShield::default();
        let tenant = acme();
        let outcome = shield
            .enforce(&audit("/api/v1/clients"), Some((&tenant, AuthSource::ApiKey)), &Resolution::none())
            .unwrap();
        let ShieldOutcome::Bound(ctx) = outcome else {
            panic!("expected a bound context");
        };
        assert_eq!(ctx.tenant_id(), &tenant);
        assert!(ctx.validate_tenant(&acme()).is_ok());
        assert_eq!(
            ctx.validate_tenant(&"globex".into()).unwrap_err().code(),
            "TENANT_MISMATCH"
        );
    }

    #[test]
    fn test_host_bound_to_other_tenant() {
        let shield = TenantShield::default();
        let resolved = Resolution {
            tenant_id: Some("globex".into()),
            source: TenantSource::CustomDomain,
            branding: None,
        };
        let tenant = acme();
        let err = shield
            .enforce(&audit("/api/v1/clients"), Some((&tenant, AuthSource::Session)), &resolved)
            .unwrap_err();
        assert_eq!(err.code(), "TENANT_MISMATCH");
    }

    #[test]
    fn test_body_guard_populates_and_rejects() {
        let shield = TenantShield::default();
        let ctx = TenantContext::new(acme(), AuthSource::ApiKey);
        let request = audit("/api/v1/payments");

        let mut body = json!({ "amount": 42 });
        shield.guard_body(&ctx, &request, &mut body).unwrap();
        assert_eq!(body["tenant_id"], "acme");

        let mut body = json!({ "amount": 42, "tenantId": "acme" });
        shield.guard_body(&ctx, &request, &mut body).unwrap();
        assert!(body.get("tenant_id").is_none());

        let mut body = json!({ "amount": 42, "tenant_id": "globex" });
        let err = shield.guard_body(&ctx, &request, &mut body).unwrap_err();
        assert_eq!(err.code(), "TENANT_MISMATCH");

        let mut body = json!([{ "name": "a" }, { "name": "b", "tenant_id": "globex" }]);
        assert!(shield.guard_body(&ctx, &request, &mut body).is_err());
    }

    #[test]
    fn test_audit_redacts_credentials() {
        let request = audit("/x");
        let auth = request.headers.iter().find(|(n, _)| n == "authorization").unwrap();
        assert_eq!(auth.1, "[redacted]");
        assert!(request.headers.iter().any(|(n, v)| n == "user-agent" && v == "curl/8"));
    }

    #[test]
    fn test_validate_owned() {
        let ctx = TenantContext::new(acme(), AuthSource::Session);
        let counter = UsageCounter {
            tenant_id: "globex".into(),
            resource: tenantguard_common::ResourceKind::Clients,
            period: "2026-04".into(),
            count: 3,
        };
        assert!(ctx.validate_owned(&counter).is_err());
        assert!(ctx.validate_owned(&acme()).is_ok());
    }
}
