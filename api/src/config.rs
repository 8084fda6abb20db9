//! Server settings
//!
//! Loaded from an optional TOML file overlaid by `TENANTGUARD__*`
//! environment variables. Every field has a default, so an empty
//! configuration starts a working server.

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tenantguard_entitlements::EntitlementConfig;
use tenantguard_idempotency::IdempotencyConfig;
use tenantguard_keys::{HashConfig, KeyConfig};
use tenantguard_tenant::{ResolverConfig, ShieldConfig};

/// Environment variable naming the settings file
pub const CONFIG_PATH_VAR: &str = "TENANTGUARD_CONFIG";

/// Settings file used when [`CONFIG_PATH_VAR`] is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/tenantguard.toml";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub resolver: ResolverSettings,
    pub shield: ShieldSettings,
    pub keys: KeySettings,
    pub session: SessionSettings,
    pub entitlements: EntitlementSettings,
    pub idempotency: IdempotencySettings,
}

impl Settings {
    /// Read the settings file (if any) and the environment overlay
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("TENANTGUARD")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Largest request body the pipeline buffers
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            body_limit_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub base_domains: Vec<String>,
    pub reserved_subdomains: Vec<String>,
    pub cache_ttl_secs: u64,
    pub negative_caching: bool,
    /// Honour `X-Tenant-ID`. Only enable behind a proxy that sets it.
    pub trust_tenant_header: bool,
    pub query_param: String,
    /// Path prefixes where the query parameter may name the tenant
    pub query_param_paths: Vec<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        let resolver = ResolverConfig::default();
        Self {
            base_domains: resolver.base_domains,
            reserved_subdomains: resolver.reserved_subdomains,
            cache_ttl_secs: resolver.cache_ttl.as_secs(),
            negative_caching: resolver.negative_caching,
            trust_tenant_header: false,
            query_param: "tenant".to_string(),
            query_param_paths: strings(&["/api/v1/public"]),
        }
    }
}

impl ResolverSettings {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            base_domains: self.base_domains.iter().map(|d| d.to_ascii_lowercase()).collect(),
            reserved_subdomains: self.reserved_subdomains.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            negative_caching: self.negative_caching,
        }
    }

    /// Whether the query parameter is honoured on `path`
    pub fn query_allowed(&self, path: &str) -> bool {
        self.query_param_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShieldSettings {
    pub allowlist: Vec<String>,
}

impl Default for ShieldSettings {
    fn default() -> Self {
        Self {
            allowlist: ShieldConfig::default().allowlist,
        }
    }
}

impl ShieldSettings {
    pub fn shield_config(&self) -> ShieldConfig {
        ShieldConfig {
            allowlist: self.allowlist.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub hash_parallelism: u32,
    pub pepper: Option<String>,
    pub default_rate_limit_per_hour: u32,
}

impl Default for KeySettings {
    fn default() -> Self {
        let keys = KeyConfig::default();
        Self {
            hash_memory_kib: keys.hash.memory_kib,
            hash_iterations: keys.hash.iterations,
            hash_parallelism: keys.hash.parallelism,
            pepper: keys.hash.pepper,
            default_rate_limit_per_hour: keys.default_rate_limit_per_hour,
        }
    }
}

impl KeySettings {
    pub fn key_config(&self) -> KeyConfig {
        KeyConfig {
            hash: HashConfig {
                memory_kib: self.hash_memory_kib,
                iterations: self.hash_iterations,
                parallelism: self.hash_parallelism,
                pepper: self.pepper.clone(),
            },
            default_rate_limit_per_hour: self.default_rate_limit_per_hour,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Lifetime of tokens minted by [`crate::auth::SessionVerifier::issue`]
    pub token_ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            issuer: None,
            audience: None,
            token_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntitlementSettings {
    pub config_ttl_secs: u64,
}

impl Default for EntitlementSettings {
    fn default() -> Self {
        Self {
            config_ttl_secs: EntitlementConfig::default().config_ttl.as_secs(),
        }
    }
}

impl EntitlementSettings {
    pub fn entitlement_config(&self) -> EntitlementConfig {
        EntitlementConfig {
            config_ttl: Duration::from_secs(self.config_ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    pub ttl_hours: u64,
    pub bypass_paths: Vec<String>,
    pub sweep_interval_secs: u64,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        let guard = IdempotencyConfig::default();
        Self {
            ttl_hours: guard.ttl.as_secs() / 3600,
            bypass_paths: guard.bypass_paths,
            sweep_interval_secs: guard.sweep_interval.as_secs(),
        }
    }
}

impl IdempotencySettings {
    pub fn idempotency_config(&self) -> IdempotencyConfig {
        IdempotencyConfig {
            ttl: Duration::from_secs(self.ttl_hours * 3600),
            bypass_paths: self.bypass_paths.clone(),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_components() {
        let settings = Settings::default();
        assert_eq!(settings.server.body_limit_bytes, 1024 * 1024);
        assert_eq!(settings.resolver.cache_ttl_secs, 300);
        assert!(settings.resolver.negative_caching);
        assert!(!settings.resolver.trust_tenant_header);
        assert_eq!(settings.keys.default_rate_limit_per_hour, 1000);
        assert_eq!(settings.entitlements.config_ttl_secs, 300);
        assert_eq!(settings.idempotency.ttl_hours, 24);
        assert_eq!(settings.idempotency.sweep_interval_secs, 600);
        assert!(settings.shield.allowlist.iter().any(|p| p == "/health"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let source = r#"
            [resolver]
            base_domains = ["Example.COM"]

            [keys]
            default_rate_limit_per_hour = 50
        "#;
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.keys.default_rate_limit_per_hour, 50);
        assert_eq!(settings.keys.hash_iterations, 2);
        assert_eq!(settings.resolver.resolver_config().base_domains, vec!["example.com"]);
        assert_eq!(settings.resolver.query_param, "tenant");
    }

    #[test]
    fn test_query_param_paths() {
        let resolver = ResolverSettings::default();
        assert!(resolver.query_allowed("/api/v1/public/menu"));
        assert!(!resolver.query_allowed("/api/v1/clients"));
    }

    #[test]
    fn test_component_conversions() {
        let settings = Settings::default();
        assert_eq!(settings.idempotency.idempotency_config().ttl, Duration::from_secs(86_400));
        assert_eq!(settings.entitlements.entitlement_config().config_ttl, Duration::from_secs(300));
        assert_eq!(settings.keys.key_config().hash.memory_kib, 19_456);
    }
}
