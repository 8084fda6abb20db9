//! Tenant Resolution
//!
//! Decides which tenant a request belongs to. First match wins:
//!
//! 1. tenant header, only when an authenticated upstream layer set it
//! 2. query parameter, only on public read routes
//! 3. verified custom domain
//! 4. subdomain of a configured base domain, minus reserved labels
//!
//! Hostname lookups go through a TTL cache. Unknown hosts are cached as
//! negative entries when `negative_caching` is on.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tenantguard_common::{Branding, GateResult, SharedClock, TenantId, TenantStore, TtlCache};
use tracing::debug;

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Platform domains tenants get subdomains under
    pub base_domains: Vec<String>,
    /// Labels that never name a tenant
    pub reserved_subdomains: Vec<String>,
    /// Lifetime of a domain cache entry
    pub cache_ttl: Duration,
    /// Cache "no tenant" answers for unknown hosts
    pub negative_caching: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_domains: vec!["tenantguard.app".to_string()],
            reserved_subdomains: ["www", "api", "app", "admin", "dashboard"]
                .into_iter()
                .map(String::from)
                .collect(),
            cache_ttl: Duration::from_secs(300),
            negative_caching: true,
        }
    }
}

/// Where a tenant id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    /// Trusted tenant header
    Header,
    /// Query parameter
    Query,
    /// Verified custom domain
    CustomDomain,
    /// Subdomain of a base domain
    Subdomain,
    /// Nothing matched
    None,
}

impl TenantSource {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::CustomDomain => "custom_domain",
            Self::Subdomain => "subdomain",
            Self::None => "none",
        }
    }

    /// Whether the tenant was derived from the Host header
    pub fn is_host_based(&self) -> bool {
        matches!(self, Self::CustomDomain | Self::Subdomain)
    }
}

/// Cached hostname → tenant binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainBinding {
    /// Bound tenant
    pub tenant_id: TenantId,
    /// Custom domain or subdomain
    pub source: TenantSource,
    /// Tenant branding
    pub branding: Option<Branding>,
}

/// Outcome of resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved tenant
    pub tenant_id: Option<TenantId>,
    /// Where it came from
    pub source: TenantSource,
    /// Branding for host-based matches
    pub branding: Option<Branding>,
}

impl Resolution {
    /// Nothing matched
    pub fn none() -> Self {
        Self {
            tenant_id: None,
            source: TenantSource::None,
            branding: None,
        }
    }

    fn from_value(value: &str, source: TenantSource) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self {
            tenant_id: Some(TenantId::new(value)),
            source,
            branding: None,
        })
    }
}

/// Request attributes the resolver looks at
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveRequest<'a> {
    /// Tenant header value, set only when the request came through a trusted upstream
    pub trusted_header: Option<&'a str>,
    /// Tenant query parameter, set only on routes where it is acceptable
    pub query: Option<&'a str>,
    /// Raw Host header
    pub host: Option<&'a str>,
}

/// Resolves tenants from request attributes
pub struct TenantResolver {
    store: Arc<dyn TenantStore>,
    config: ResolverConfig,
    cache: TtlCache<String, Option<DomainBinding>>,
}

impl TenantResolver {
    /// Resolver with an empty domain cache
    pub fn new(store: Arc<dyn TenantStore>, config: ResolverConfig, clock: SharedClock) -> Self {
        let cache = TtlCache::new(config.cache_ttl, clock);
        Self { store, config, cache }
    }

    /// Resolve the tenant for a request
    pub async fn resolve(&self, request: &ResolveRequest<'_>) -> GateResult<Resolution> {
        if let Some(resolution) = request
            .trusted_header
            .and_then(|h| Resolution::from_value(h, TenantSource::Header))
        {
            return Ok(resolution);
        }

        if let Some(resolution) = request
            .query
            .and_then(|q| Resolution::from_value(q, TenantSource::Query))
        {
            return Ok(resolution);
        }

        let Some(host) = request.host.and_then(normalize_host) else {
            return Ok(Resolution::none());
        };

        Ok(match self.lookup_host(&host).await? {
            Some(binding) => Resolution {
                tenant_id: Some(binding.tenant_id),
                source: binding.source,
                branding: binding.branding,
            },
            None => Resolution::none(),
        })
    }

    /// Hostname lookup through the domain cache
    pub async fn lookup_host(&self, host: &str) -> GateResult<Option<DomainBinding>> {
        if let Some(cached) = self.cache.get(host) {
            return Ok(cached);
        }

        let binding = match self.store.find_by_verified_domain(host).await? {
            Some(tenant) => Some(DomainBinding {
                tenant_id: tenant.id,
                source: TenantSource::CustomDomain,
                branding: tenant.branding,
            }),
            None => match self.extract_subdomain(host) {
                Some(label) => self.store.find_by_slug(&label).await?.map(|tenant| DomainBinding {
                    tenant_id: tenant.id,
                    source: TenantSource::Subdomain,
                    branding: tenant.branding,
                }),
                None => None,
            },
        };

        debug!(host, found = binding.is_some(), "domain cache miss");
        if binding.is_some() || self.config.negative_caching {
            self.cache.insert(host.to_string(), binding.clone());
        }
        Ok(binding)
    }

    /// Tenant label of `host` under a base domain, if any
    pub fn extract_subdomain(&self, host: &str) -> Option<String> {
        self.config.base_domains.iter().find_map(|base| {
            let label = host.strip_suffix(base.as_str())?.strip_suffix('.')?;
            if label.is_empty() || label.contains('.') {
                return None;
            }
            if self
                .config
                .reserved_subdomains
                .iter()
                .any(|r| r.eq_ignore_ascii_case(label))
            {
                return None;
            }
            Some(label.to_string())
        })
    }

    /// Drop the cached binding for one hostname
    pub fn invalidate_domain(&self, hostname: &str) -> bool {
        match normalize_host(hostname) {
            Some(host) => self.cache.invalidate(host.as_str()),
            None => false,
        }
    }

    /// Drop every cached binding pointing at a tenant.
    ///
    /// Negative entries go too: one of them may be a host the tenant has
    /// just verified.
    pub fn invalidate_tenant(&self, tenant_id: &TenantId) -> usize {
        self.cache.invalidate_where(|_, binding| match binding {
            Some(binding) => &binding.tenant_id == tenant_id,
            None => true,
        })
    }

    /// Remove expired cache entries
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Active configuration
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }
}

/// Lower-case the host and strip port and trailing dot
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    // IP literals never name a tenant
    if raw.is_empty() || raw.starts_with('[') {
        return None;
    }
    let host = raw.split(':').next().unwrap_or(raw);
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tenantguard_common::*;

    /// Counts store round-trips
    struct CountingStore {
        inner: MemoryStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl TenantStore for CountingStore {
        async fn get_tenant(&self, id: &TenantId) -> StoreResult<Option<Tenant>> {
            self.inner.get_tenant(id).await
        }

        async fn find_by_verified_domain(&self, hostname: &str) -> StoreResult<Option<Tenant>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_verified_domain(hostname).await
        }

        async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<Tenant>> {
            self.inner.find_by_slug(slug).await
        }

        async fn get_plan(&self, tier: PlanTier) -> StoreResult<Option<Plan>> {
            self.inner.get_plan(tier).await
        }
    }

    fn setup() -> (TenantResolver, Arc<CountingStore>, Arc<ManualClock>) {
        let inner = MemoryStore::new();
        inner.upsert_tenant(
            Tenant::new("acme", "Acme", PlanTier::Pro)
                .with_slug("acme")
                .with_custom_domain("booking.acme.fr", true)
                .with_branding(Branding {
                    display_name: "Acme".into(),
                    ..Default::default()
                }),
        );
        inner.upsert_tenant(
            Tenant::new("globex", "Globex", PlanTier::Starter).with_custom_domain("globex.io", false),
        );
        let store = Arc::new(CountingStore {
            inner,
            lookups: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap()));
        let resolver = TenantResolver::new(store.clone(), ResolverConfig::default(), clock.clone());
        (resolver, store, clock)
    }

    fn host(h: &str) -> ResolveRequest<'_> {
        ResolveRequest {
            host: Some(h),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolution_order() {
        let (resolver, _, _) = setup();

        let request = ResolveRequest {
            trusted_header: Some("from-header"),
            query: Some("from-query"),
            host: Some("booking.acme.fr"),
        };
        let r = resolver.resolve(&request).await.unwrap();
        assert_eq!(r.source, TenantSource::Header);
        assert_eq!(r.tenant_id, Some(TenantId::from("from-header")));

        let request = ResolveRequest {
            trusted_header: None,
            ..request
        };
        assert_eq!(resolver.resolve(&request).await.unwrap().source, TenantSource::Query);

        let r = resolver.resolve(&host("Booking.Acme.fr:443")).await.unwrap();
        assert_eq!(r.source, TenantSource::CustomDomain);
        assert_eq!(r.tenant_id, Some(TenantId::from("acme")));
        assert_eq!(r.branding.unwrap().display_name, "Acme");
    }

    #[tokio::test]
    async fn test_unverified_domain_is_ignored() {
        let (resolver, _, _) = setup();
        let r = resolver.resolve(&host("globex.io")).await.unwrap();
        assert_eq!(r, Resolution::none());
    }

    #[tokio::test]
    async fn test_subdomain_and_reserved_labels() {
        let (resolver, _, _) = setup();

        let r = resolver.resolve(&host("acme.tenantguard.app")).await.unwrap();
        assert_eq!(r.source, TenantSource::Subdomain);
        assert_eq!(r.tenant_id, Some(TenantId::from("acme")));

        for reserved in ["www", "api", "app", "admin", "dashboard"] {
            let h = format!("{reserved}.tenantguard.app");
            assert_eq!(resolver.extract_subdomain(&h), None, "{reserved} must be reserved");
        }
        assert_eq!(resolver.extract_subdomain("a.b.tenantguard.app"), None);
        assert_eq!(resolver.extract_subdomain("tenantguard.app"), None);
        assert_eq!(resolver.extract_subdomain("acme.example.com"), None);
    }

    #[tokio::test]
    async fn test_domain_cache_ttl_and_invalidation() {
        let (resolver, store, clock) = setup();

        resolver.resolve(&host("booking.acme.fr")).await.unwrap();
        resolver.resolve(&host("booking.acme.fr")).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);

        // TTL expiry forces a fresh lookup
        clock.advance(chrono::Duration::minutes(5));
        resolver.resolve(&host("booking.acme.fr")).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);

        // Explicit invalidation by name
        assert!(resolver.invalidate_domain("booking.acme.fr"));
        resolver.resolve(&host("booking.acme.fr")).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 3);

        // Invalidation by tenant
        assert_eq!(resolver.invalidate_tenant(&"acme".into()), 1);
        resolver.resolve(&host("booking.acme.fr")).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_negative_caching() {
        let (resolver, store, _) = setup();

        for _ in 0..3 {
            let r = resolver.resolve(&host("unknown.example")).await.unwrap();
            assert!(r.tenant_id.is_none());
        }
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tenant_invalidation_clears_negative_entries() {
        let (resolver, store, _) = setup();

        let r = resolver.resolve(&host("new.acme.fr")).await.unwrap();
        assert!(r.tenant_id.is_none());
        resolver.resolve(&host("booking.acme.fr")).await.unwrap();

        store.inner.upsert_tenant(
            Tenant::new("acme", "Acme", PlanTier::Pro)
                .with_slug("acme")
                .with_custom_domain("new.acme.fr", true),
        );
        // Cached "no tenant" still answers until the tenant is invalidated
        assert!(resolver.resolve(&host("new.acme.fr")).await.unwrap().tenant_id.is_none());

        assert_eq!(resolver.invalidate_tenant(&"acme".into()), 2);
        let r = resolver.resolve(&host("new.acme.fr")).await.unwrap();
        assert_eq!(r.source, TenantSource::CustomDomain);
        assert_eq!(r.tenant_id, Some(TenantId::from("acme")));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Acme.Tenantguard.App:8080"), Some("acme.tenantguard.app".into()));
        assert_eq!(normalize_host("example.com."), Some("example.com".into()));
        assert_eq!(normalize_host("[::1]:8080"), None);
        assert_eq!(normalize_host("  "), None);
    }
}
