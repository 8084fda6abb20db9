//! In-memory store (for testing and development)

use crate::error::StoreResult;
use crate::model::*;
use crate::store::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Implements every repository trait over process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    plans: RwLock<HashMap<PlanTier, Plan>>,
    keys: RwLock<HashMap<Uuid, ApiKey>>,
    resources: RwLock<Vec<ResourceRow>>,
    counters: DashMap<(TenantId, ResourceKind, String), u64>,
    idempotency: DashMap<(String, TenantId), IdempotencyRecord>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tenant
    pub fn upsert_tenant(&self, tenant: Tenant) {
        self.tenants.write().insert(tenant.id.clone(), tenant);
    }

    /// Insert or replace a plan row
    pub fn insert_plan(&self, plan: Plan) {
        self.plans.write().insert(plan.tier, plan);
    }

    /// Add a business row for the live aggregates
    pub fn insert_resource(&self, tenant_id: &TenantId, kind: ResourceKind, size_bytes: u64, created_at: DateTime<Utc>) {
        self.resources.write().push(ResourceRow {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            kind,
            size_bytes,
            created_at,
        });
    }

    /// Stored key by id
    pub fn key(&self, key_id: Uuid) -> Option<ApiKey> {
        self.keys.read().get(&key_id).cloned()
    }

    /// Audit rows written so far
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().clone()
    }

    /// Number of idempotency records, expired ones included
    pub fn idempotency_len(&self) -> usize {
        self.idempotency.len()
    }

    /// Snapshot of idempotency records
    pub fn idempotency_records(&self) -> Vec<IdempotencyRecord> {
        self.idempotency.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn get_tenant(&self, id: &TenantId) -> StoreResult<Option<Tenant>> {
        Ok(self.tenants.read().get(id).cloned())
    }

    async fn find_by_verified_domain(&self, hostname: &str) -> StoreResult<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| {
                t.custom_domain
                    .as_ref()
                    .is_some_and(|d| d.verified && d.hostname.eq_ignore_ascii_case(hostname))
            })
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| t.slug.eq_ignore_ascii_case(slug))
            .cloned())
    }

    async fn get_plan(&self, tier: PlanTier) -> StoreResult<Option<Plan>> {
        Ok(self.plans.read().get(&tier).cloned())
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn find_active_by_prefix(&self, prefix: &str) -> StoreResult<Vec<ApiKey>> {
        Ok(self
            .keys
            .read()
            .values()
            .filter(|k| k.active && k.prefix == prefix)
            .cloned()
            .collect())
    }

    async fn insert_key(&self, key: ApiKey) -> StoreResult<()> {
        self.keys.write().insert(key.id, key);
        Ok(())
    }

    async fn list_keys(&self, tenant_id: &TenantId) -> StoreResult<Vec<ApiKey>> {
        let mut keys: Vec<_> = self
            .keys
            .read()
            .values()
            .filter(|k| &k.tenant_id == tenant_id)
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.created_at);
        Ok(keys)
    }

    async fn deactivate_key(&self, tenant_id: &TenantId, key_id: Uuid) -> StoreResult<bool> {
        let mut keys = self.keys.write();
        match keys.get_mut(&key_id) {
            Some(key) if &key.tenant_id == tenant_id && key.active => {
                key.active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_last_used(&self, key_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(key) = self.keys.write().get_mut(&key_id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn count_resources(
        &self,
        tenant_id: &TenantId,
        kind: ResourceKind,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<u64> {
        let count = self
            .resources
            .read()
            .iter()
            .filter(|r| &r.tenant_id == tenant_id && r.kind == kind)
            .filter(|r| since.map_or(true, |s| r.created_at >= s))
            .count();
        Ok(count as u64)
    }

    async fn sum_resource_bytes(&self, tenant_id: &TenantId, kind: ResourceKind) -> StoreResult<u64> {
        Ok(self
            .resources
            .read()
            .iter()
            .filter(|r| &r.tenant_id == tenant_id && r.kind == kind)
            .map(|r| r.size_bytes)
            .sum())
    }

    async fn get_counter(&self, tenant_id: &TenantId, kind: ResourceKind, period: &str) -> StoreResult<u64> {
        Ok(self
            .counters
            .get(&(tenant_id.clone(), kind, period.to_string()))
            .map(|c| *c)
            .unwrap_or(0))
    }

    async fn increment_counter(
        &self,
        tenant_id: &TenantId,
        kind: ResourceKind,
        period: &str,
        amount: u64,
    ) -> StoreResult<u64> {
        let mut counter = self
            .counters
            .entry((tenant_id.clone(), kind, period.to_string()))
            .or_insert(0);
        *counter = counter.saturating_add(amount);
        Ok(*counter)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn find_unexpired(
        &self,
        key: &str,
        tenant_id: &TenantId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<IdempotencyRecord>> {
        Ok(self
            .idempotency
            .get(&(key.to_string(), tenant_id.clone()))
            .filter(|r| !r.is_expired(now))
            .map(|r| r.clone()))
    }

    async fn insert_if_absent(&self, record: IdempotencyRecord) -> StoreResult<IdempotencyRecord> {
        let target = (record.key.clone(), record.tenant_id.clone());
        let mut slot = self.idempotency.entry(target).or_insert_with(|| record.clone());
        // An expired occupant gives way, a live one is never overwritten
        if slot.is_expired(record.created_at) {
            *slot = record;
        }
        Ok(slot.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let before = self.idempotency.len();
        self.idempotency.retain(|_, r| !r.is_expired(now));
        Ok(before - self.idempotency.len())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: AuditEntry) -> StoreResult<()> {
        self.audit.write().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(key: &str, body: &str, created_at: DateTime<Utc>) -> IdempotencyRecord {
        IdempotencyRecord {
            key: key.into(),
            tenant_id: "acme".into(),
            path: "/api/v1/payments".into(),
            method: "POST".into(),
            fingerprint: "fp".into(),
            request_body: Vec::new(),
            response_status: 201,
            response_body: body.as_bytes().to_vec(),
            response_content_type: None,
            created_at,
            expires_at: created_at + Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn test_idempotency_first_write_wins() {
        let store = MemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();

        let first = store.insert_if_absent(record("k1", "first", t0)).await.unwrap();
        let second = store.insert_if_absent(record("k1", "second", t0)).await.unwrap();
        assert_eq!(first.response_body, b"first");
        assert_eq!(second.response_body, b"first");

        // After expiry the slot can be reused
        let later = t0 + Duration::hours(25);
        let third = store.insert_if_absent(record("k1", "third", later)).await.unwrap();
        assert_eq!(third.response_body, b"third");
    }

    #[tokio::test]
    async fn test_counter_upsert_increments() {
        let store = MemoryStore::new();
        let tenant = TenantId::from("acme");

        assert_eq!(store.get_counter(&tenant, ResourceKind::AiImages, "2026-05").await.unwrap(), 0);
        store.increment_counter(&tenant, ResourceKind::AiImages, "2026-05", 1).await.unwrap();
        let value = store.increment_counter(&tenant, ResourceKind::AiImages, "2026-05", 2).await.unwrap();
        assert_eq!(value, 3);
        assert_eq!(store.get_counter(&tenant, ResourceKind::AiImages, "2026-06").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deactivate_checks_owner() {
        let store = MemoryStore::new();
        let key = ApiKey {
            id: Uuid::new_v4(),
            tenant_id: "acme".into(),
            name: "ci".into(),
            prefix: "nxk_live_abcdefg".into(),
            key_hash: "hash".into(),
            scopes: vec![],
            environment: KeyEnvironment::Live,
            active: true,
            expires_at: None,
            rate_limit_per_hour: 100,
            last_used_at: None,
            created_at: Utc::now(),
        };
        let id = key.id;
        store.insert_key(key).await.unwrap();

        tokio_test::assert_ok!(store.deactivate_key(&"globex".into(), id).await);
        assert!(store.key(id).unwrap().active);

        assert!(store.deactivate_key(&"acme".into(), id).await.unwrap());
        assert!(store.find_active_by_prefix("nxk_live_abcdefg").await.unwrap().is_empty());
    }
}
