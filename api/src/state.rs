//! Shared application state

use crate::auth::SessionVerifier;
use crate::config::{ResolverSettings, Settings};
use std::sync::Arc;
use std::time::Duration;
use tenantguard_common::{
    ApiKeyStore, AuditSink, GateResult, IdempotencyStore, MemoryStore, SharedClock, TenantStore, UsageStore,
};
use tenantguard_entitlements::{ModuleAccessControl, QuotaTracker};
use tenantguard_idempotency::IdempotencyGuard;
use tenantguard_keys::ApiKeyAuthenticator;
use tenantguard_tenant::{TenantResolver, TenantShield};
use tokio::task::JoinHandle;
use tracing::debug;

/// Repository handles the pipeline runs against
#[derive(Clone)]
pub struct Stores {
    pub tenants: Arc<dyn TenantStore>,
    pub keys: Arc<dyn ApiKeyStore>,
    pub usage: Arc<dyn UsageStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    /// Every repository backed by one in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tenants: store.clone(),
            keys: store.clone(),
            usage: store.clone(),
            idempotency: store.clone(),
            audit: store,
        }
    }
}

/// Application state
pub struct AppState {
    pub resolver: Arc<TenantResolver>,
    pub resolver_settings: ResolverSettings,
    pub shield: Arc<TenantShield>,
    pub keys: Arc<ApiKeyAuthenticator>,
    pub sessions: Arc<SessionVerifier>,
    pub access: Arc<ModuleAccessControl>,
    pub quotas: Arc<QuotaTracker>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub body_limit: usize,
    pub clock: SharedClock,
}

/// State handle passed to handlers and middleware
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(settings: &Settings, stores: Stores, clock: SharedClock) -> GateResult<Self> {
        Ok(Self {
            resolver: Arc::new(TenantResolver::new(
                stores.tenants.clone(),
                settings.resolver.resolver_config(),
                clock.clone(),
            )),
            resolver_settings: settings.resolver.clone(),
            shield: Arc::new(TenantShield::new(settings.shield.shield_config())),
            keys: Arc::new(ApiKeyAuthenticator::new(
                stores.keys,
                stores.audit,
                &settings.keys.key_config(),
                clock.clone(),
            )?),
            sessions: Arc::new(SessionVerifier::new(&settings.session, clock.clone())),
            access: Arc::new(ModuleAccessControl::new(
                stores.tenants,
                &settings.entitlements.entitlement_config(),
                clock.clone(),
            )),
            quotas: Arc::new(QuotaTracker::new(stores.usage, clock.clone())),
            idempotency: Arc::new(IdempotencyGuard::new(
                stores.idempotency,
                settings.idempotency.idempotency_config(),
                clock.clone(),
            )),
            body_limit: settings.server.body_limit_bytes,
            clock,
        })
    }

    /// State over a single in-memory store
    pub fn in_memory(settings: &Settings, store: Arc<MemoryStore>, clock: SharedClock) -> GateResult<SharedState> {
        Ok(Arc::new(Self::new(settings, Stores::memory(store), clock)?))
    }

    /// Periodically drop expired cache entries and stale rate-limit buckets
    pub fn spawn_maintenance(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let state = Arc::clone(self);
        let period = period.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let domains = state.resolver.purge_expired();
                let configs = state.access.purge_expired();
                let buckets = state.keys.limiter().purge_stale();
                debug!(domains, configs, buckets, "cache maintenance");
            }
        })
    }
}
