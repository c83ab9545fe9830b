//! Authorization configuration
//!
//! Loaded with the `config` crate from an optional file plus `ROWGUARD__*`
//! environment variables (`ROWGUARD__AUTHORIZATION__CACHE__ENABLED=false`).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};

use rowguard_common::{DEFAULT_ACTION, RowguardError};

pub const DEFAULT_ACTION_PROPERTY: &str = "authorization.default_action";
pub const STRICT_PROPERTY: &str = "authorization.strict";
pub const CACHE_ENABLED_PROPERTY: &str = "authorization.cache.enabled";
pub const CACHE_MAX_CAPACITY_PROPERTY: &str = "authorization.cache.max_capacity";
pub const CACHE_TTL_SECONDS_PROPERTY: &str = "authorization.cache.ttl_seconds";
pub const POLICY_FILE_PROPERTY: &str = "authorization.policy.file";

pub const DEFAULT_CACHE_MAX_CAPACITY: u64 = 10_000;
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

const ENV_PREFIX: &str = "ROWGUARD";
const ENV_SEPARATOR: &str = "__";

/// Settings read by the session factory
#[derive(Clone, Debug, Default)]
pub struct AuthorizationConfig {
    pub config: Config,
}

impl AuthorizationConfig {
    /// Load from the environment only
    pub fn new() -> anyhow::Result<Self> {
        Self::build(None)
    }

    /// Load from `path` (format picked from the extension), then the environment
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::build(Some(path.as_ref()))
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    fn build(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RowguardError::ConfigError(e.to_string()))?;
        Ok(Self { config })
    }

    pub fn default_action(&self) -> String {
        self.config
            .get_string(DEFAULT_ACTION_PROPERTY)
            .unwrap_or(DEFAULT_ACTION.to_string())
    }

    /// Whether queries on unregistered entities fail instead of passing through
    pub fn is_strict(&self) -> bool {
        self.config.get_bool(STRICT_PROPERTY).unwrap_or(true)
    }

    pub fn cache_enabled(&self) -> bool {
        self.config.get_bool(CACHE_ENABLED_PROPERTY).unwrap_or(true)
    }

    pub fn cache_max_capacity(&self) -> u64 {
        self.config
            .get_int(CACHE_MAX_CAPACITY_PROPERTY)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_CACHE_MAX_CAPACITY)
    }

    pub fn cache_ttl(&self) -> Duration {
        let seconds = self
            .config
            .get_int(CACHE_TTL_SECONDS_PROPERTY)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECONDS);
        Duration::from_secs(seconds)
    }

    pub fn policy_file(&self) -> Option<String> {
        self.config.get_string(POLICY_FILE_PROPERTY).ok()
    }
}
