//! Entitlements: module gating and usage quotas
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    MODULE ACCESS CONTROL                      │
//! │  tenant config cache (TTL 5m) → subscription gate → CheckKind │
//! │    canal  : channel_options[id]                               │
//! │    metier : vertical_module == id                             │
//! │    plan   : override ?? plan.features[id]                     │
//! │    always : plan is active                                    │
//! └───────────────────────────────┬───────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼───────────────────────────────┐
//! │                       QUOTA TRACKER                           │
//! │  plan limits (-1 = unlimited) vs live aggregates / counters   │
//! │  UsageTicket::increment_usage() after the operation succeeds  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]

pub mod access;
pub mod catalog;
pub mod quota;

pub use access::{EntitlementConfig, ModuleAccessControl, TenantConfig};
pub use catalog::{builtin_plan, can_plan_access_module, CheckKind, Module};
pub use quota::{within_limit, QuotaStatus, QuotaTracker, UsageTicket};
