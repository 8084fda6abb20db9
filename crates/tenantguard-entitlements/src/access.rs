//! Module Access Control
//!
//! Decides whether a tenant may use a module. Tenant configuration is read
//! through a per-tenant TTL cache; any write to a tenant's plan, channels,
//! vertical or overrides must be followed by [`ModuleAccessControl::invalidate`].

use crate::catalog::{builtin_plan, can_plan_access_module, CheckKind, Module};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tenantguard_common::{
    Clock, GateError, GateResult, Plan, SharedClock, TenantId, TenantStatus, TenantStore, TtlCache,
};
use tracing::{debug, warn};

/// Entitlement settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementConfig {
    /// Lifetime of a cached tenant configuration
    pub config_ttl: Duration,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            config_ttl: Duration::from_secs(300),
        }
    }
}

/// Cached entitlement view of a tenant
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    pub plan: Option<Plan>,
    pub status: TenantStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub channel_options: BTreeMap<String, bool>,
    pub vertical_module: Option<String>,
    pub module_overrides: BTreeMap<String, bool>,
}

impl TenantConfig {
    /// Whether `module` is active for this configuration
    pub fn allows(&self, module: Module) -> bool {
        let id = module.id();
        match module.kind() {
            CheckKind::Canal => self.channel_options.get(id).copied().unwrap_or(false),
            CheckKind::Metier => self.vertical_module.as_deref() == Some(id),
            CheckKind::Plan => match self.module_overrides.get(id) {
                Some(enabled) => *enabled,
                None => self.plan.as_ref().is_some_and(|p| p.feature(id)),
            },
            CheckKind::Always => self.plan.is_some(),
        }
    }

    /// Subscription status gate
    pub fn check_subscription(&self, now: DateTime<Utc>) -> GateResult<()> {
        match self.status {
            TenantStatus::Active => Ok(()),
            TenantStatus::Suspended => Err(GateError::SubscriptionSuspended),
            TenantStatus::Expired => Err(GateError::SubscriptionExpired),
            TenantStatus::Trial => match self.trial_ends_at {
                Some(ended_at) if ended_at <= now => Err(GateError::TrialExpired { ended_at }),
                _ => Ok(()),
            },
        }
    }
}

fn upgrade_hint(module: Module) -> String {
    match module.kind() {
        CheckKind::Canal => "/settings/channels".to_string(),
        CheckKind::Metier => "/settings/vertical".to_string(),
        CheckKind::Plan => format!("/billing/upgrade?module={}", module.id()),
        CheckKind::Always => "/billing".to_string(),
    }
}

/// Plan, channel and vertical gating
pub struct ModuleAccessControl {
    tenants: Arc<dyn TenantStore>,
    cache: TtlCache<TenantId, Arc<TenantConfig>>,
    clock: SharedClock,
}

impl ModuleAccessControl {
    pub fn new(tenants: Arc<dyn TenantStore>, config: &EntitlementConfig, clock: SharedClock) -> Self {
        Self {
            tenants,
            cache: TtlCache::new(config.config_ttl, clock.clone()),
            clock,
        }
    }

    /// Entitlement view of a tenant, from cache when fresh
    pub async fn tenant_config(&self, tenant_id: &TenantId) -> GateResult<Arc<TenantConfig>> {
        if let Some(config) = self.cache.get(tenant_id) {
            return Ok(config);
        }

        let tenant = self
            .tenants
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| GateError::TenantNotFound(tenant_id.clone()))?;

        let plan = match tenant.plan {
            Some(tier) => Some(self.tenants.get_plan(tier).await?.unwrap_or_else(|| builtin_plan(tier))),
            None => None,
        };

        let config = Arc::new(TenantConfig {
            tenant_id: tenant.id,
            plan,
            status: tenant.status,
            trial_ends_at: tenant.trial_ends_at,
            channel_options: tenant.channel_options,
            vertical_module: tenant.vertical_module,
            module_overrides: tenant.module_overrides,
        });
        debug!(tenant_id = %tenant_id, "loaded tenant entitlements");
        self.cache.insert(tenant_id.clone(), config.clone());
        Ok(config)
    }

    /// Whether `module_id` is active for the tenant.
    ///
    /// A suspended, expired or lapsed-trial tenant has nothing active but
    /// billing. Unclassified ids are otherwise allowed and logged so they can
    /// be added to [`Module`].
    pub async fn has_module(&self, tenant_id: &TenantId, module_id: &str) -> GateResult<bool> {
        let config = self.tenant_config(tenant_id).await?;
        let module = Module::from_id(module_id);
        if let Err(e) = self.check_subscription(&config, module) {
            debug!(module = module_id, tenant_id = %tenant_id, code = e.code(), "subscription inactive");
            return Ok(false);
        }

        match module {
            Some(module) => Ok(config.allows(module)),
            None => {
                warn!(module = module_id, tenant_id = %tenant_id, "unclassified module allowed");
                Ok(true)
            }
        }
    }

    /// Route gate for a module. `tenant_id` must come from an authenticated source.
    pub async fn check_module(&self, tenant_id: Option<&TenantId>, module_id: &str) -> GateResult<Arc<TenantConfig>> {
        let tenant_id = tenant_id.ok_or(GateError::Unauthenticated)?;
        let config = self.tenant_config(tenant_id).await?;

        let module = Module::from_id(module_id);
        self.check_subscription(&config, module)?;

        match module {
            None => {
                warn!(module = module_id, tenant_id = %tenant_id, "unclassified module allowed");
                Ok(config)
            }
            Some(module) if config.allows(module) => Ok(config),
            Some(module) => {
                debug!(module = module_id, tenant_id = %tenant_id, "module not activated");
                Err(GateError::ModuleNotActivated {
                    module: module_id.to_string(),
                    upgrade_hint: upgrade_hint(module),
                })
            }
        }
    }

    /// Coarse gate against the static plan hierarchy
    pub async fn require_plan_module(&self, tenant_id: Option<&TenantId>, module_id: &str) -> GateResult<()> {
        let tenant_id = tenant_id.ok_or(GateError::Unauthenticated)?;
        let config = self.tenant_config(tenant_id).await?;

        let module = Module::from_id(module_id);
        self.check_subscription(&config, module)?;

        let Some(module) = module else {
            warn!(module = module_id, tenant_id = %tenant_id, "unclassified module allowed");
            return Ok(());
        };

        let current_plan = config.plan.as_ref().map(|p| p.tier);
        let included = current_plan.is_some_and(|tier| can_plan_access_module(tier.as_str(), module_id));
        if included {
            Ok(())
        } else {
            Err(GateError::ModuleNotIncluded {
                module: module_id.to_string(),
                current_plan,
                required_plan: module.min_tier(),
            })
        }
    }

    /// Billing stays reachable whatever the subscription state
    fn check_subscription(&self, config: &TenantConfig, module: Option<Module>) -> GateResult<()> {
        if module == Some(Module::Billing) {
            return Ok(());
        }
        config.check_subscription(self.clock.now())
    }

    /// Drop the cached configuration of a tenant
    pub fn invalidate(&self, tenant_id: &TenantId) -> bool {
        self.cache.invalidate(tenant_id)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}
