//! Tenant Data Model

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Tenants
// =============================================================================

/// Opaque tenant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Subscription status. Tenants are never hard-deleted, only moved
/// between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// Paid and in good standing
    Active,
    /// Free trial until `trial_ends_at`
    Trial,
    /// Blocked, usually for non-payment
    Suspended,
    /// Subscription ended
    Expired,
}

/// Branding snapshot served alongside domain resolution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Branding {
    /// Name shown on tenant-branded pages
    pub display_name: String,
    /// Logo location
    pub logo_url: Option<String>,
    /// CSS colour
    pub primary_color: Option<String>,
}

/// Custom domain bound to a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDomain {
    /// Lower-case hostname without port
    pub hostname: String,
    /// Only verified domains take part in resolution
    pub verified: bool,
}

/// Tenant definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant ID
    pub id: TenantId,
    /// Display name
    pub name: String,
    /// Subdomain label under one of the platform base domains
    pub slug: String,
    /// Subscribed plan, `None` when no plan is active
    pub plan: Option<PlanTier>,
    /// Subscription status
    pub status: TenantStatus,
    /// End of the trial, only meaningful for `Trial`
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Tenant-owned hostname
    pub custom_domain: Option<CustomDomain>,
    /// Branding served with domain resolution
    pub branding: Option<Branding>,
    /// Channel flags (`canal` modules)
    pub channel_options: BTreeMap<String, bool>,
    /// The single active vertical module (`metier` modules)
    pub vertical_module: Option<String>,
    /// Per-tenant overrides of plan feature columns
    pub module_overrides: BTreeMap<String, bool>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create an active tenant on `plan`, slug defaults to the id
    pub fn new(id: impl Into<TenantId>, name: &str, plan: PlanTier) -> Self {
        let id = id.into();
        Self {
            slug: id.as_str().to_string(),
            id,
            name: name.to_string(),
            plan: Some(plan),
            status: TenantStatus::Active,
            trial_ends_at: None,
            custom_domain: None,
            branding: None,
            channel_options: BTreeMap::new(),
            vertical_module: None,
            module_overrides: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the subdomain label
    pub fn with_slug(mut self, slug: &str) -> Self {
        self.slug = slug.to_ascii_lowercase();
        self
    }

    /// Set the subscription status
    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    /// Put the tenant on trial until `ends_at`
    pub fn with_trial_until(mut self, ends_at: DateTime<Utc>) -> Self {
        self.status = TenantStatus::Trial;
        self.trial_ends_at = Some(ends_at);
        self
    }

    /// Bind a custom domain
    pub fn with_custom_domain(mut self, hostname: &str, verified: bool) -> Self {
        self.custom_domain = Some(CustomDomain {
            hostname: hostname.to_ascii_lowercase(),
            verified,
        });
        self
    }

    /// Set branding
    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = Some(branding);
        self
    }

    /// Set a channel flag
    pub fn with_channel(mut self, channel: &str, enabled: bool) -> Self {
        self.channel_options.insert(channel.to_string(), enabled);
        self
    }

    /// Set the vertical module
    pub fn with_vertical(mut self, module: &str) -> Self {
        self.vertical_module = Some(module.to_string());
        self
    }

    /// Override a plan feature column
    pub fn with_override(mut self, module: &str, enabled: bool) -> Self {
        self.module_overrides.insert(module.to_string(), enabled);
        self
    }

    /// Drop the plan
    pub fn without_plan(mut self) -> Self {
        self.plan = None;
        self
    }
}

// =============================================================================
// Plans
// =============================================================================

/// Plan tier, ordered `Starter < Pro < Business`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Entry tier
    Starter,
    /// Middle tier
    Pro,
    /// Top tier
    Business,
}

impl PlanTier {
    /// Every tier, lowest first
    pub const ALL: [PlanTier; 3] = [PlanTier::Starter, PlanTier::Pro, PlanTier::Business];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Business => "business",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}

/// A numeric ceiling. Stored as `-1` for unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Limit {
    /// No ceiling
    Unlimited,
    /// Inclusive ceiling
    Max(u64),
}

impl From<i64> for Limit {
    fn from(raw: i64) -> Self {
        u64::try_from(raw).map_or(Limit::Unlimited, Limit::Max)
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unlimited => -1,
            Limit::Max(max) => i64::try_from(max).unwrap_or(i64::MAX),
        }
    }
}

/// Plan-defined quota limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Client records
    pub clients: Limit,
    /// Stored bytes
    pub storage_bytes: Limit,
    /// AI posts per calendar month
    pub ai_posts_per_month: Limit,
    /// AI images per calendar month
    pub ai_images_per_month: Limit,
}

impl QuotaLimits {
    /// Limit for a resource kind
    pub fn get(&self, kind: ResourceKind) -> Limit {
        match kind {
            ResourceKind::Clients => self.clients,
            ResourceKind::StorageBytes => self.storage_bytes,
            ResourceKind::AiPosts => self.ai_posts_per_month,
            ResourceKind::AiImages => self.ai_images_per_month,
        }
    }

    /// No ceiling on anything
    pub fn unlimited() -> Self {
        Self {
            clients: Limit::Unlimited,
            storage_bytes: Limit::Unlimited,
            ai_posts_per_month: Limit::Unlimited,
            ai_images_per_month: Limit::Unlimited,
        }
    }
}

/// Immutable plan reference data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Tier this plan defines
    pub tier: PlanTier,
    /// Feature column → enabled
    pub features: BTreeMap<String, bool>,
    /// Quota ceilings
    pub limits: QuotaLimits,
}

impl Plan {
    /// Whether a feature column is on for this plan
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }
}

// =============================================================================
// API keys
// =============================================================================

/// Environment encoded in an API key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEnvironment {
    /// Production
    Live,
    /// Test mode, blocked on side-effecting routes
    Test,
    /// Sandbox
    Sandbox,
}

impl KeyEnvironment {
    /// Every environment
    pub const ALL: [KeyEnvironment; 3] = [Self::Live, Self::Test, Self::Sandbox];

    /// Literal prefix every key of this environment starts with
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Live => "nxk_live_",
            Self::Test => "nxk_test_",
            Self::Sandbox => "nxk_sbx_",
        }
    }

    /// Environment of a raw key, by prefix
    pub fn detect(raw_key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|env| raw_key.starts_with(env.prefix()))
    }
}

/// Stored API key. The cleartext secret is never part of this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key id
    pub id: Uuid,
    /// Owning tenant, fixed at creation
    pub tenant_id: TenantId,
    /// Label chosen by the tenant
    pub name: String,
    /// Lookup shard, not unique
    pub prefix: String,
    /// Salted hash of the full secret (PHC string)
    pub key_hash: String,
    /// Granted scopes, `admin` grants all
    pub scopes: Vec<String>,
    /// Environment from the key prefix
    pub environment: KeyEnvironment,
    /// Cleared on revocation
    pub active: bool,
    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Hourly request ceiling
    pub rate_limit_per_hour: u32,
    /// Last successful authentication
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the expiry has passed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Resource kinds under quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Client records
    Clients,
    /// Stored bytes
    StorageBytes,
    /// AI-generated posts
    AiPosts,
    /// AI-generated images
    AiImages,
}

impl ResourceKind {
    /// Every resource kind
    pub const ALL: [ResourceKind; 4] = [
        Self::Clients,
        Self::StorageBytes,
        Self::AiPosts,
        Self::AiImages,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::StorageBytes => "storage",
            Self::AiPosts => "ai_posts",
            Self::AiImages => "ai_images",
        }
    }

    /// Whether the ceiling resets each calendar month
    pub fn is_monthly(&self) -> bool {
        matches!(self, Self::AiPosts | Self::AiImages)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar period key (`YYYY-MM`) used by usage counters
pub fn period_key(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// First instant of the calendar month containing `at`
pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(at, |naive| Utc.from_utc_datetime(&naive))
}

/// Running per-period usage counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Counted resource
    pub resource: ResourceKind,
    /// `YYYY-MM`
    pub period: String,
    /// Running total
    pub count: u64,
}

/// Business-domain row the live aggregates count or sum over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRow {
    /// Row id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Resource kind
    pub kind: ResourceKind,
    /// Size, counted by storage quotas
    pub size_bytes: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Idempotency & audit
// =============================================================================

/// Stored outcome of a mutating request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Caller-supplied or derived key
    pub key: String,
    /// Tenant the key is scoped to
    pub tenant_id: TenantId,
    /// Request path
    pub path: String,
    /// Request method
    pub method: String,
    /// Hash of method, path and body
    pub fingerprint: String,
    /// Request body as received
    pub request_body: Vec<u8>,
    /// Stored status
    pub response_status: u16,
    /// Stored body, replayed verbatim
    pub response_body: Vec<u8>,
    /// Stored content type
    pub response_content_type: Option<String>,
    /// When the original request completed
    pub created_at: DateTime<Utc>,
    /// End of the replay window
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Whether the replay window has closed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Audit row written after an API-key authenticated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Tenant the request ran as
    pub tenant_id: TenantId,
    /// Key that authenticated it
    pub key_id: Option<Uuid>,
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Response status
    pub status: u16,
    /// Handler latency
    pub latency_ms: u64,
    /// Completion time
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_ordering() {
        assert!(PlanTier::Starter < PlanTier::Pro);
        assert!(PlanTier::Pro < PlanTier::Business);
        assert_eq!("Business".parse::<PlanTier>().unwrap(), PlanTier::Business);
        assert!("gold".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_limit_sentinel() {
        assert_eq!(Limit::from(-1), Limit::Unlimited);
        assert_eq!(Limit::from(1000), Limit::Max(1000));
        assert_eq!(i64::from(Limit::Unlimited), -1);

        let json = serde_json::to_string(&Limit::Unlimited).unwrap();
        assert_eq!(json, "-1");
        let parsed: Limit = serde_json::from_str("250").unwrap();
        assert_eq!(parsed, Limit::Max(250));
    }

    #[test]
    fn test_key_environment_detection() {
        assert_eq!(KeyEnvironment::detect("nxk_test_abc"), Some(KeyEnvironment::Test));
        assert_eq!(KeyEnvironment::detect("nxk_sbx_abc"), Some(KeyEnvironment::Sandbox));
        assert_eq!(KeyEnvironment::detect("sk_live_abc"), None);
    }

    #[test]
    fn test_period_helpers() {
        let at = Utc.with_ymd_and_hms(2026, 2, 17, 13, 45, 0).unwrap();
        assert_eq!(period_key(at), "2026-02");
        assert_eq!(month_start(at), Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
    }
}
