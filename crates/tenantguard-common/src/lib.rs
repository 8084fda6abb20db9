//! TenantGuard Common - Shared types for the multi-tenant access layer
//!
//! This crate provides the pieces every enforcement stage agrees on:
//! - The tenant/plan/key/usage data model
//! - The stable error taxonomy returned to HTTP callers
//! - Repository traits for the shared persistent store
//! - An in-memory store for tests and local development
//! - An injectable clock and a TTL cache built on it
//!
//! Nothing in here knows about HTTP. The `api` crate maps [`GateError`]
//! onto status codes and response bodies.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Process-local TTL cache
pub mod cache;
/// Injectable time source
pub mod clock;
/// Denial and storage errors
pub mod error;
/// In-memory store
pub mod memory;
/// Tenant, plan, key and usage records
pub mod model;
/// Repository traits
pub mod store;

pub use cache::TtlCache;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{GateError, GateResult, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use model::*;
pub use store::{ApiKeyStore, AuditSink, IdempotencyStore, TenantStore, UsageStore};
