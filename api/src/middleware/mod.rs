//! Enforcement pipeline
//!
//! Global stages, outermost first:
//!
//! ```text
//! resolve_tenant → authenticate → tenant_shield → [route gate] → handler
//! ```
//!
//! Route gates (see [`gates::gated`]) add scope, test-mode, module, quota
//! and idempotency checks per route.

pub mod auth;
pub mod gates;
pub mod idempotency;
pub mod shield;
pub mod tenant;

pub use auth::authenticate;
pub use gates::{gated, Gate};
pub use shield::tenant_shield;
pub use tenant::resolve_tenant;
