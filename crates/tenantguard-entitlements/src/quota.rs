//! Quota Tracker
//!
//! Usage ceilings per resource kind against plan limits.
//!
//! | Resource      | Current usage                         | Passes when              |
//! |---------------|---------------------------------------|--------------------------|
//! | `clients`     | live count of rows                    | `current < limit`        |
//! | `storage`     | live sum of sizes                     | `current + size <= limit`|
//! | `ai_posts`    | live count since the month started    | `current < limit`        |
//! | `ai_images`   | counter row for the current month     | `current < limit`        |
//!
//! A passing check hands out a [`UsageTicket`]. The handler redeems it only
//! after the protected operation succeeded.

use serde::Serialize;
use std::sync::Arc;
use tenantguard_common::{
    month_start, period_key, Clock, GateError, GateResult, Limit, Plan, ResourceKind, SharedClock, TenantId,
    UsageStore,
};
use tracing::{debug, warn};

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub resource: ResourceKind,
    pub ok: bool,
    pub current: u64,
    pub limit: Limit,
    /// Share of the limit in use, 0 for unlimited
    pub percentage: f64,
    /// Set when usage could not be read and the check failed open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Ceiling rule. `incoming` only counts for sized resources.
pub fn within_limit(kind: ResourceKind, current: u64, incoming: u64, limit: Limit) -> bool {
    match limit {
        Limit::Unlimited => true,
        Limit::Max(max) => match kind {
            ResourceKind::StorageBytes => current.saturating_add(incoming) <= max,
            ResourceKind::Clients | ResourceKind::AiPosts | ResourceKind::AiImages => current < max,
        },
    }
}

fn percentage(current: u64, limit: Limit) -> f64 {
    match limit {
        Limit::Unlimited => 0.0,
        Limit::Max(0) => 100.0,
        Limit::Max(max) => (current as f64 / max as f64 * 100.0).min(100.0),
    }
}

/// Usage to record once the protected operation succeeded
#[must_use = "call increment_usage after the operation succeeds"]
pub struct UsageTicket {
    usage: Arc<dyn UsageStore>,
    tenant_id: TenantId,
    resource: ResourceKind,
    period: String,
    amount: u64,
}

impl std::fmt::Debug for UsageTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTicket")
            .field("tenant_id", &self.tenant_id)
            .field("resource", &self.resource)
            .field("period", &self.period)
            .field("amount", &self.amount)
            .finish()
    }
}

impl UsageTicket {
    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Upsert-or-increment the per-period counter row
    pub async fn increment_usage(self) -> GateResult<u64> {
        let value = self
            .usage
            .increment_counter(&self.tenant_id, self.resource, &self.period, self.amount)
            .await?;
        debug!(tenant_id = %self.tenant_id, resource = %self.resource, period = %self.period, value, "usage recorded");
        Ok(value)
    }
}

/// Computes and enforces usage ceilings
pub struct QuotaTracker {
    usage: Arc<dyn UsageStore>,
    clock: SharedClock,
}

impl QuotaTracker {
    pub fn new(usage: Arc<dyn UsageStore>, clock: SharedClock) -> Self {
        Self { usage, clock }
    }

    async fn current_usage(&self, tenant_id: &TenantId, kind: ResourceKind) -> GateResult<u64> {
        let now = self.clock.now();
        let current = match kind {
            ResourceKind::Clients => self.usage.count_resources(tenant_id, kind, None).await?,
            ResourceKind::StorageBytes => self.usage.sum_resource_bytes(tenant_id, kind).await?,
            ResourceKind::AiPosts => self.usage.count_resources(tenant_id, kind, Some(month_start(now))).await?,
            ResourceKind::AiImages => self.usage.get_counter(tenant_id, kind, &period_key(now)).await?,
        };
        Ok(current)
    }

    /// Compute `{ok, current, limit, percentage}` for one resource.
    ///
    /// A tenant without a plan has a zero ceiling. Unlimited skips the store.
    /// A failed usage read passes with a warning.
    pub async fn check(&self, tenant_id: &TenantId, plan: Option<&Plan>, kind: ResourceKind, incoming: u64) -> QuotaStatus {
        let limit = plan.map_or(Limit::Max(0), |p| p.limits.get(kind));
        if limit == Limit::Unlimited {
            return QuotaStatus {
                resource: kind,
                ok: true,
                current: 0,
                limit,
                percentage: 0.0,
                warning: None,
            };
        }

        match self.current_usage(tenant_id, kind).await {
            Ok(current) => QuotaStatus {
                resource: kind,
                ok: within_limit(kind, current, incoming, limit),
                current,
                limit,
                percentage: percentage(current, limit),
                warning: None,
            },
            Err(e) => {
                warn!(tenant_id = %tenant_id, resource = %kind, error = %e, "usage read failed, quota check passes");
                QuotaStatus {
                    resource: kind,
                    ok: true,
                    current: 0,
                    limit,
                    percentage: 0.0,
                    warning: Some("usage unavailable, quota not enforced".to_string()),
                }
            }
        }
    }

    /// Deny when over the ceiling, otherwise hand out a ticket for the
    /// usage the operation will add
    pub async fn enforce(
        &self,
        tenant_id: &TenantId,
        plan: Option<&Plan>,
        kind: ResourceKind,
        incoming: u64,
    ) -> GateResult<(QuotaStatus, UsageTicket)> {
        let status = self.check(tenant_id, plan, kind, incoming).await;
        if !status.ok {
            let limit = match status.limit {
                Limit::Max(max) => max,
                Limit::Unlimited => u64::MAX,
            };
            debug!(tenant_id = %tenant_id, resource = %kind, current = status.current, limit, "quota exceeded");
            return Err(GateError::QuotaExceeded {
                resource: kind,
                current: status.current,
                limit,
            });
        }

        let ticket = UsageTicket {
            usage: self.usage.clone(),
            tenant_id: tenant_id.clone(),
            resource: kind,
            period: period_key(self.clock.now()),
            amount: if kind == ResourceKind::StorageBytes { incoming } else { 1 },
        };
        Ok((status, ticket))
    }

    /// Status of every resource kind
    pub async fn summary(&self, tenant_id: &TenantId, plan: Option<&Plan>) -> Vec<QuotaStatus> {
        let mut statuses = Vec::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            statuses.push(self.check(tenant_id, plan, kind, 0).await);
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_plan;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use tenantguard_common::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 15, 9, 30, 0).unwrap()
    }

    fn tracker(store: Arc<MemoryStore>) -> QuotaTracker {
        QuotaTracker::new(store, Arc::new(ManualClock::new(now())))
    }

    fn plan_with(limits: QuotaLimits) -> Plan {
        Plan {
            limits,
            ..builtin_plan(PlanTier::Starter)
        }
    }

    #[tokio::test]
    async fn test_clients_ceiling() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::from("acme");
        for _ in 0..999 {
            store.insert_resource(&tenant, ResourceKind::Clients, 0, now());
        }
        let qt = tracker(store.clone());
        let plan = builtin_plan(PlanTier::Starter);

        let status = qt.check(&tenant, Some(&plan), ResourceKind::Clients, 0).await;
        assert!(status.ok);
        assert_eq!(status.current, 999);
        assert_eq!(status.limit, Limit::Max(1000));

        store.insert_resource(&tenant, ResourceKind::Clients, 0, now());
        let status = qt.check(&tenant, Some(&plan), ResourceKind::Clients, 0).await;
        assert!(!status.ok);
        assert_eq!(status.current, 1000);
        assert_eq!(status.percentage, 100.0);

        let err = qt.enforce(&tenant, Some(&plan), ResourceKind::Clients, 0).await.unwrap_err();
        assert_eq!(err.code(), "QUOTA_EXCEEDED");
        assert_eq!(err.status(), 402);
        assert_eq!(err.context()["current"], 1000);
    }

    #[tokio::test]
    async fn test_storage_counts_incoming_size() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::from("acme");
        store.insert_resource(&tenant, ResourceKind::StorageBytes, 700, now());
        let qt = tracker(store);
        let plan = plan_with(QuotaLimits {
            storage_bytes: Limit::Max(1000),
            ..QuotaLimits::unlimited()
        });

        assert!(qt.check(&tenant, Some(&plan), ResourceKind::StorageBytes, 300).await.ok);
        assert!(!qt.check(&tenant, Some(&plan), ResourceKind::StorageBytes, 301).await.ok);

        let (_, ticket) = qt.enforce(&tenant, Some(&plan), ResourceKind::StorageBytes, 250).await.unwrap();
        assert_eq!(ticket.amount(), 250);
    }

    #[tokio::test]
    async fn test_posts_scoped_to_current_month() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::from("acme");
        store.insert_resource(&tenant, ResourceKind::AiPosts, 0, now() - Duration::days(30));
        store.insert_resource(&tenant, ResourceKind::AiPosts, 0, now() - Duration::days(1));
        let qt = tracker(store);
        let plan = plan_with(QuotaLimits {
            ai_posts_per_month: Limit::Max(2),
            ..QuotaLimits::unlimited()
        });

        let status = qt.check(&tenant, Some(&plan), ResourceKind::AiPosts, 0).await;
        assert_eq!(status.current, 1);
        assert!(status.ok);
    }

    #[tokio::test]
    async fn test_images_use_counter_and_ticket() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::from("acme");
        let qt = tracker(store.clone());
        let plan = plan_with(QuotaLimits {
            ai_images_per_month: Limit::Max(2),
            ..QuotaLimits::unlimited()
        });

        for expected in 1..=2 {
            let (_, ticket) = qt.enforce(&tenant, Some(&plan), ResourceKind::AiImages, 0).await.unwrap();
            assert_eq!(ticket.increment_usage().await.unwrap(), expected);
        }
        // A ticket that is never redeemed does not count
        let (_, _unused) = tokio_test::assert_ok!(
            QuotaTracker::new(store.clone(), Arc::new(ManualClock::new(now() + Duration::days(31))))
                .enforce(&tenant, Some(&plan), ResourceKind::AiImages, 0)
                .await
        );
        assert!(qt.enforce(&tenant, Some(&plan), ResourceKind::AiImages, 0).await.is_err());
        assert_eq!(store.get_counter(&tenant, ResourceKind::AiImages, "2026-07").await.unwrap(), 2);
    }

    /// Fails every usage read
    struct BrokenStore;

    #[async_trait]
    impl UsageStore for BrokenStore {
        async fn count_resources(&self, _: &TenantId, _: ResourceKind, _: Option<DateTime<Utc>>) -> StoreResult<u64> {
            Err(StoreError::Backend("timeout".into()))
        }
        async fn sum_resource_bytes(&self, _: &TenantId, _: ResourceKind) -> StoreResult<u64> {
            Err(StoreError::Backend("timeout".into()))
        }
        async fn get_counter(&self, _: &TenantId, _: ResourceKind, _: &str) -> StoreResult<u64> {
            Err(StoreError::Backend("timeout".into()))
        }
        async fn increment_counter(&self, _: &TenantId, _: ResourceKind, _: &str, _: u64) -> StoreResult<u64> {
            Err(StoreError::Backend("timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let qt = QuotaTracker::new(Arc::new(BrokenStore), Arc::new(ManualClock::new(now())));
        let plan = builtin_plan(PlanTier::Starter);
        let status = qt.check(&"acme".into(), Some(&plan), ResourceKind::Clients, 0).await;
        assert!(status.ok);
        assert!(status.warning.is_some());
    }

    #[tokio::test]
    async fn test_unlimited_skips_store() {
        let qt = QuotaTracker::new(Arc::new(BrokenStore), Arc::new(ManualClock::new(now())));
        let plan = builtin_plan(PlanTier::Business);
        let status = qt.check(&"acme".into(), Some(&plan), ResourceKind::Clients, 0).await;
        assert!(status.ok);
        assert!(status.warning.is_none());
    }

    #[tokio::test]
    async fn test_no_plan_means_no_allowance() {
        let qt = tracker(Arc::new(MemoryStore::new()));
        let status = qt.check(&"acme".into(), None, ResourceKind::Clients, 0).await;
        assert!(!status.ok);
        assert_eq!(qt.summary(&"acme".into(), None).await.len(), ResourceKind::ALL.len());
    }

    proptest! {
        #[test]
        fn prop_counted_resources_block_at_limit(current in 0u64..5_000, max in 0u64..5_000) {
            for kind in [ResourceKind::Clients, ResourceKind::AiPosts, ResourceKind::AiImages] {
                prop_assert_eq!(within_limit(kind, current, 0, Limit::Max(max)), current < max);
            }
        }

        #[test]
        fn prop_storage_includes_incoming(current in 0u64..1 << 40, incoming in 0u64..1 << 40, max in 0u64..1 << 41) {
            prop_assert_eq!(
                within_limit(ResourceKind::StorageBytes, current, incoming, Limit::Max(max)),
                current + incoming <= max
            );
            prop_assert!(within_limit(ResourceKind::StorageBytes, current, incoming, Limit::Unlimited));
        }
    }
}
