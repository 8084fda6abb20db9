//! Repositories - Persistence abstraction for the shared store
//!
//! The relational store itself is out of scope; these traits are the query
//! surface the enforcement stages need: equality lookups, count/sum
//! aggregates and upserts keyed on a conflict target.

use crate::error::StoreResult;
use crate::model::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Tenant and plan reference data
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Get tenant by ID
    async fn get_tenant(&self, id: &TenantId) -> StoreResult<Option<Tenant>>;

    /// Tenant owning a verified custom domain
    async fn find_by_verified_domain(&self, hostname: &str) -> StoreResult<Option<Tenant>>;

    /// Tenant owning a subdomain label
    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Tenant>>;

    /// Plan definition by tier
    async fn get_plan(&self, tier: PlanTier) -> StoreResult<Option<Plan>>;
}

/// API key records
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Active keys sharing a lookup prefix
    async fn find_active_by_prefix(&self, prefix: &str) -> StoreResult<Vec<ApiKey>>;

    /// Store a new key
    async fn insert_key(&self, key: ApiKey) -> StoreResult<()>;

    /// Keys owned by a tenant, active or not
    async fn list_keys(&self, tenant_id: &TenantId) -> StoreResult<Vec<ApiKey>>;

    /// Deactivate a key if `tenant_id` owns it. Returns whether a key changed.
    async fn deactivate_key(&self, tenant_id: &TenantId, key_id: Uuid) -> StoreResult<bool>;

    /// Record a successful authentication
    async fn touch_last_used(&self, key_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Usage aggregates and per-period counters
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Count resource rows, optionally only those created at or after `since`
    async fn count_resources(
        &self,
        tenant_id: &TenantId,
        kind: ResourceKind,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<u64>;

    /// Sum of `size_bytes` over resource rows
    async fn sum_resource_bytes(&self, tenant_id: &TenantId, kind: ResourceKind) -> StoreResult<u64>;

    /// Counter value for a period, zero when the row does not exist
    async fn get_counter(&self, tenant_id: &TenantId, kind: ResourceKind, period: &str) -> StoreResult<u64>;

    /// Upsert-or-increment a counter row, returns the new value
    async fn increment_counter(
        &self,
        tenant_id: &TenantId,
        kind: ResourceKind,
        period: &str,
        amount: u64,
    ) -> StoreResult<u64>;
}

/// Idempotency records keyed on `(key, tenant_id)`
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record for `(key, tenant)` that has not expired at `now`
    async fn find_unexpired(
        &self,
        key: &str,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<IdempotencyRecord>>;

    /// Insert unless an unexpired record holds the conflict target.
    /// Returns whichever record is stored afterwards.
    async fn insert_if_absent(&self, record: IdempotencyRecord) -> StoreResult<IdempotencyRecord>;

    /// Delete records expired at `now`, returns how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize>;
}

/// Sink for request audit rows
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an audit row
    async fn record(&self, entry: AuditEntry) -> StoreResult<()>;
}
