//! Tenant Resolution & Isolation
//!
//! First two stages of the request pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         INBOUND REQUEST                                 │
//! │    X-Tenant-ID (trusted upstream) | ?tenant= | Host                     │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼─────────────────────────────────────────┐
//! │                        TENANT RESOLVER                                  │
//! │  header → query → verified custom domain → subdomain                    │
//! │  ┌──────────────────────────────────────────────┐                       │
//! │  │  DOMAIN CACHE  hostname → tenant  (TTL 5m)   │                       │
//! │  └──────────────────────────────────────────────┘                       │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │  (authentication attaches the tenant)
//! ┌───────────────────────────────▼─────────────────────────────────────────┐
//! │                         TENANT SHIELD                                   │
//! │  allowlist | TENANT_REQUIRED | domain coherence | body guard            │
//! │  TenantContext::validate_tenant() for every business handler            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

/// Tenant resolution
pub mod resolver;
/// Tenant isolation
pub mod shield;

pub use resolver::{DomainBinding, Resolution, ResolveRequest, ResolverConfig, TenantResolver, TenantSource};
pub use shield::{
    is_mutating, AuthSource, RequestAudit, ShieldConfig, ShieldOutcome, TenantContext, TenantScoped, TenantShield,
};
