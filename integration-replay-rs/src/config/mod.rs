//! Configuration management for the replay engine
//!
//! This module resolves per-tenant base URLs, static credentials, and the
//! date-search policy, with support for environment variables.

use std::env;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::error::{Result, EngineError};
use once_cell::sync::Lazy;

/// Hallucinated-date horizon used when no override is configured
pub const MAX_FUTURE_DAYS: i64 = 180;

/// Narrowest date window the scheduling APIs accept
pub const MIN_RANGE_DAYS: i64 = 3;

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value.parse::<i64>()
            .map_err(|e| EngineError::configuration(format!("Invalid integer for key {}: {}", key, e)))
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(EngineError::configuration(format!("Invalid boolean value for key {}: {}", key, value))),
        }
    }

    /// Get a comma-separated list of strings
    fn get_list(&self, key: &str) -> Result<Vec<String>> {
        let value = self.get_string(key)?;
        Ok(value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get an integer configuration value with a default
    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Get a boolean configuration value with a default
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables (e.g., "TENANT")
    namespace: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a namespace for environment variables
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    pub(crate) fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key)
            .map_err(|e| {
                match e {
                    env::VarError::NotPresent => {
                        EngineError::configuration(format!("Environment variable not set: {}", env_key))
                    }
                    env::VarError::NotUnicode(_) => {
                        EngineError::configuration(format!("Environment variable is not valid unicode: {}", env_key))
                    }
                }
            })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory config provider with initial values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// A composite config provider that tries multiple providers in order
#[derive(Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    /// Create a new composite config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the chain
    pub fn add_provider(&mut self, provider: impl ConfigProvider + 'static) {
        self.providers.push(Box::new(provider));
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        for provider in &self.providers {
            if let Ok(value) = provider.get_string(key) {
                return Ok(value);
            }
        }

        Err(EngineError::configuration(format!("Configuration key not found in any provider: {}", key)))
    }
}

/// Global default configuration provider
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> = Lazy::new(|| {
    Arc::new(EnvConfigProvider::new().with_prefix("REPLAY"))
});

/// Trait for validated configuration sections
pub trait ServiceConfig: Debug + Send + Sync {
    /// Validate this configuration
    fn validate(&self) -> Result<()>;

    /// Section name
    fn service_name(&self) -> &str;
}

/// Which practice-system flavour a tenant talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantKind {
    /// GUID-keyed legacy API fronted by a JSON gateway
    Legacy,
    /// REST practice API
    Rest,
}

impl TenantKind {
    /// Parse a configured tenant kind
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" | "guid" | "cloud9" => Ok(TenantKind::Legacy),
            "rest" => Ok(TenantKind::Rest),
            other => Err(EngineError::configuration(format!("Unknown tenant kind: {}", other))),
        }
    }

    /// Default expansion widths, in days
    pub fn default_tiers(&self) -> Vec<i64> {
        match self {
            TenantKind::Legacy => vec![14, 28, 56],
            TenantKind::Rest => vec![30, 60, 90],
        }
    }

    /// Date format the upstream API expects
    pub fn date_format(&self) -> &'static str {
        match self {
            TenantKind::Legacy => "%m/%d/%Y",
            TenantKind::Rest => "%Y-%m-%d",
        }
    }

    /// Fallback correlation token when neither caller nor config provide one
    pub fn default_correlation_token(&self) -> &'static str {
        match self {
            TenantKind::Legacy => "replay-legacy-uui",
            TenantKind::Rest => "replay-rest-correlation",
        }
    }
}

/// Authentication scheme applied to every upstream call for a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthScheme {
    Basic,
    Bearer,
}

impl AuthScheme {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthScheme::Basic),
            "bearer" => Ok(AuthScheme::Bearer),
            other => Err(EngineError::configuration(format!("Unknown auth scheme: {}", other))),
        }
    }
}

/// Per-tenant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    pub kind: TenantKind,
    pub base_url: String,
    /// Pre-encoded credential (base64 user:pass for Basic, token for Bearer)
    pub credential: String,
    pub auth_scheme: AuthScheme,
    pub correlation_token: String,
    /// Ordered expansion widths in days
    pub expansion_tiers: Vec<i64>,
    /// Earliest date the tenant's environment has data for
    pub sandbox_floor: Option<NaiveDate>,
    pub date_format: String,
    pub default_location_id: Option<String>,
    pub default_provider_id: Option<String>,
    pub default_appointment_type_id: Option<String>,
}

impl TenantConfig {
    /// Minimal tenant with kind-specific defaults
    pub fn new(id: impl Into<String>, kind: TenantKind, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            base_url: base_url.into(),
            credential: String::new(),
            auth_scheme: match kind {
                TenantKind::Legacy => AuthScheme::Basic,
                TenantKind::Rest => AuthScheme::Bearer,
            },
            correlation_token: kind.default_correlation_token().to_string(),
            expansion_tiers: kind.default_tiers(),
            sandbox_floor: None,
            date_format: kind.date_format().to_string(),
            default_location_id: None,
            default_provider_id: None,
            default_appointment_type_id: None,
        }
    }

    /// Value of the Authorization header
    pub fn authorization_header(&self) -> Option<String> {
        if self.credential.is_empty() {
            return None;
        }
        Some(match self.auth_scheme {
            AuthScheme::Basic => format!("Basic {}", self.credential),
            AuthScheme::Bearer => format!("Bearer {}", self.credential),
        })
    }

    /// Load a tenant's configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P, tenant_id: &str) -> Result<Self> {
        let key = |suffix: &str| format!("{}_{}", tenant_id, suffix);

        let kind = TenantKind::parse(&provider.get_string(&key("kind"))?)?;
        let base_url = provider.get_string(&key("base_url"))?;
        let mut config = Self::new(tenant_id, kind, base_url);

        config.credential = provider.get_string_or(&key("credential"), "");
        if let Ok(scheme) = provider.get_string(&key("auth_scheme")) {
            config.auth_scheme = AuthScheme::parse(&scheme)?;
        }
        if let Ok(token) = provider.get_string(&key("correlation_token")) {
            config.correlation_token = token;
        }
        if let Ok(tiers) = provider.get_list(&key("expansion_tiers")) {
            config.expansion_tiers = tiers
                .iter()
                .map(|t| {
                    t.parse::<i64>().map_err(|e| {
                        EngineError::configuration(format!("Invalid expansion tier '{}': {}", t, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
        }
        if let Ok(floor) = provider.get_string(&key("sandbox_floor")) {
            let parsed = NaiveDate::parse_from_str(&floor, "%Y-%m-%d").map_err(|e| {
                EngineError::configuration(format!("Invalid sandbox floor '{}': {}", floor, e))
            })?;
            config.sandbox_floor = Some(parsed);
        }
        config.default_location_id = provider.get_string(&key("location_id")).ok();
        config.default_provider_id = provider.get_string(&key("provider_id")).ok();
        config.default_appointment_type_id = provider.get_string(&key("appointment_type_id")).ok();

        config.validate()?;
        Ok(config)
    }
}

impl ServiceConfig for TenantConfig {
    fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(EngineError::configuration(format!("Tenant {} base URL is required", self.id)));
        }

        if self.expansion_tiers.is_empty() {
            return Err(EngineError::configuration(format!("Tenant {} needs at least one expansion tier", self.id)));
        }

        if self.expansion_tiers.iter().any(|t| *t <= 0) {
            return Err(EngineError::configuration(format!("Tenant {} expansion tiers must be positive", self.id)));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        &self.id
    }
}

/// Engine-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub tenants: HashMap<String, TenantConfig>,
    pub default_tenant: String,
    pub timeout_seconds: u64,
    pub max_future_days: i64,
    pub min_range_days: i64,
}

impl EngineConfig {
    /// Config holding a single tenant, which is also the default
    pub fn single(tenant: TenantConfig) -> Self {
        let default_tenant = tenant.id.clone();
        let mut tenants = HashMap::new();
        tenants.insert(tenant.id.clone(), tenant);
        Self {
            tenants,
            default_tenant,
            timeout_seconds: 30,
            max_future_days: MAX_FUTURE_DAYS,
            min_range_days: MIN_RANGE_DAYS,
        }
    }

    /// Register another tenant
    pub fn with_tenant(mut self, tenant: TenantConfig) -> Self {
        self.tenants.insert(tenant.id.clone(), tenant);
        self
    }

    /// Resolve a tenant by id, falling back to the default tenant
    pub fn tenant(&self, tenant_id: Option<&str>) -> Result<&TenantConfig> {
        let id = tenant_id.unwrap_or(&self.default_tenant);
        self.tenants
            .get(id)
            .ok_or_else(|| EngineError::configuration(format!("Unknown tenant: {}", id)))
    }

    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let ids = provider.get_list("tenants")?;
        let mut tenants = HashMap::new();
        for id in &ids {
            tenants.insert(id.clone(), TenantConfig::from_provider(provider, id)?);
        }

        let default_tenant = provider.get_string("default_tenant")
            .ok()
            .or_else(|| ids.first().cloned())
            .unwrap_or_default();

        let config = Self {
            tenants,
            default_tenant,
            timeout_seconds: provider.get_int_or("timeout_seconds", 30).max(1) as u64,
            max_future_days: provider.get_int_or("max_future_days", MAX_FUTURE_DAYS),
            min_range_days: provider.get_int_or("min_range_days", MIN_RANGE_DAYS),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `REPLAY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_provider(&**DEFAULT_PROVIDER)
    }
}

impl ServiceConfig for EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(EngineError::configuration("At least one tenant is required"));
        }

        if !self.tenants.contains_key(&self.default_tenant) {
            return Err(EngineError::configuration(format!(
                "Default tenant {} is not configured",
                self.default_tenant
            )));
        }

        if self.min_range_days < 1 {
            return Err(EngineError::configuration("min_range_days must be at least 1"));
        }

        if self.max_future_days <= self.min_range_days {
            return Err(EngineError::configuration("max_future_days must exceed min_range_days"));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "replay-engine"
    }
}
