//! vrsrv configuration
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. YAML file (`config/vrsrv.yaml`, or `--config` / `VRSRV_CONFIG`)
//! 3. legacy deployment variables (`SCOPE`, `CLIENT_ID`, `AUD`, ...)
//! 4. `VRSRV_` variables, `__` separating sections (`VRSRV_API__PORT=80`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use common::serde_helpers::string_or_number;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::reconcile::ConflictPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/vrsrv.yaml";
pub const DEFAULT_PORT: u16 = 6010;

/// Deployment variable names kept from earlier releases, and the key each
/// one sets
const LEGACY_ENV: &[(&str, &str)] = &[
    ("SCOPE", "auth.scope"),
    ("CLIENT_ID", "auth.client_id"),
    ("ENVIRONMENT", "auth.environment"),
    ("AUTHORIZATION_KEY", "auth.authorization_key"),
    ("AUD", "auth.aud"),
    ("AUTH_DOMAIN", "auth.auth_domain"),
    ("API_URL", "registry.url"),
    ("API_VERSION", "registry.api_version"),
    ("RESOURCES_HOST", "forward.resources_url"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "vrsrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily-rolling log files are written here when set
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}

/// JSON:API resource service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStoreConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://resource".to_string(),
            timeout_secs: 10,
        }
    }
}

impl LocalStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Verenigingsregister beheer API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    /// Sent as `vr-api-version`
    pub api_version: Option<String>,
    /// Sent as `vr-initiator`
    pub initiator: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "https://beheer.verenigingen.vlaanderen.be".to_string(),
            api_version: Some("v1".to_string()),
            initiator: None,
            timeout_secs: 15,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthEnvironment {
    #[serde(alias = "dev")]
    Dev,
    #[serde(alias = "prod")]
    Prod,
}

/// OAuth2 client-credentials settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub environment: AuthEnvironment,
    #[serde(deserialize_with = "string_or_number")]
    pub client_id: String,
    pub scope: String,
    /// Audience of the client assertion; base URL of the DEV token endpoint
    pub aud: String,
    pub auth_domain: String,
    /// Basic credentials for the DEV token endpoint
    pub authorization_key: Option<String>,
    /// Directory holding the PROD signing key (`*.pem`)
    pub key_dir: PathBuf,
    /// Overrides the token endpoint derived from `environment`
    pub token_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            environment: AuthEnvironment::Dev,
            client_id: String::new(),
            scope: String::new(),
            aud: String::new(),
            auth_domain: "authenticatie.vlaanderen.be".to_string(),
            authorization_key: None,
            key_dir: PathBuf::from("/config"),
            token_url: None,
            timeout_secs: 10,
        }
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub conflict_policy: ConflictPolicy,
}

/// JSON-LD context documents fetched by the URI resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UriCacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
    pub timeout_secs: u64,
}

impl Default for UriCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            ttl_secs: 3600,
            timeout_secs: 10,
        }
    }
}

impl UriCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Pass-through of unmatched requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub resources_url: String,
    pub timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            resources_url: "http://resource".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ForwardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VrsrvConfig {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub local_store: LocalStoreConfig,
    pub registry: RegistryConfig,
    pub auth: AuthConfig,
    pub reconcile: ReconcileConfig,
    pub uri_cache: UriCacheConfig,
    pub forward: ForwardConfig,
}

/// Config key set by a legacy deployment variable
pub fn legacy_env_key(name: &str) -> Option<&'static str> {
    LEGACY_ENV
        .iter()
        .find(|(env, _)| env.eq_ignore_ascii_case(name))
        .map(|(_, key)| *key)
}

impl VrsrvConfig {
    /// Provider chain without reading anything yet
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let legacy_names: Vec<&str> = LEGACY_ENV.iter().map(|(env, _)| *env).collect();

        Figment::from(Serialized::defaults(VrsrvConfig::default()))
            .merge(Yaml::file(path))
            .merge(
                Env::raw()
                    .only(&legacy_names)
                    .map(|key| legacy_env_key(key.as_str()).unwrap_or_default().into()),
            )
            .merge(Env::prefixed("VRSRV_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.name.is_empty() {
            bail!("Service name cannot be empty");
        }
        if self.api.port == 0 {
            bail!("API port cannot be 0");
        }

        let urls = [
            ("local_store.url", &self.local_store.url),
            ("registry.url", &self.registry.url),
            ("forward.resources_url", &self.forward.resources_url),
        ];
        for (key, url) in urls {
            if url.trim().is_empty() {
                bail!("{} cannot be empty", key);
            }
        }

        let timeouts = [
            ("local_store.timeout_secs", self.local_store.timeout_secs),
            ("registry.timeout_secs", self.registry.timeout_secs),
            ("auth.timeout_secs", self.auth.timeout_secs),
            ("uri_cache.timeout_secs", self.uri_cache.timeout_secs),
            ("forward.timeout_secs", self.forward.timeout_secs),
        ];
        for (key, secs) in timeouts {
            if secs == 0 {
                bail!("{} must be greater than 0", key);
            }
        }

        if self.uri_cache.max_entries == 0 {
            bail!("uri_cache.max_entries must be greater than 0");
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn from_yaml(yaml: &str) -> Result<VrsrvConfig> {
        VrsrvConfig::from_figment(
            Figment::from(Serialized::defaults(VrsrvConfig::default())).merge(Yaml::string(yaml)),
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = VrsrvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "0.0.0.0:6010");
        assert_eq!(config.reconcile.conflict_policy, ConflictPolicy::Block);
        assert_eq!(config.auth.environment, AuthEnvironment::Dev);
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let config = from_yaml(
            r#"
api:
  port: 8080
registry:
  url: "http://registry:9000"
  initiator: "OVO000000"
auth:
  environment: PROD
  client_id: 1234
reconcile:
  conflict_policy: log_only
"#,
        )
        .unwrap();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.registry.url, "http://registry:9000");
        assert_eq!(config.registry.initiator.as_deref(), Some("OVO000000"));
        assert_eq!(config.registry.api_version.as_deref(), Some("v1"));
        assert_eq!(config.auth.environment, AuthEnvironment::Prod);
        assert_eq!(config.auth.client_id, "1234");
        assert_eq!(config.reconcile.conflict_policy, ConflictPolicy::LogOnly);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(from_yaml("api:\n  port: 0\n").is_err());
        assert!(from_yaml("registry:\n  url: \"\"\n").is_err());
        assert!(from_yaml("forward:\n  timeout_secs: 0\n").is_err());
        assert!(from_yaml("uri_cache:\n  max_entries: 0\n").is_err());
    }

    #[test]
    fn test_legacy_env_keys() {
        assert_eq!(legacy_env_key("SCOPE"), Some("auth.scope"));
        assert_eq!(legacy_env_key("resources_host"), Some("forward.resources_url"));
        assert_eq!(legacy_env_key("API_URL"), Some("registry.url"));
        assert_eq!(legacy_env_key("HOME"), None);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let figment = Figment::from(Serialized::defaults(VrsrvConfig::default()))
            .merge(Yaml::file(dir.path().join("absent.yaml")));
        let config = VrsrvConfig::from_figment(figment).unwrap();
        assert_eq!(config.local_store.url, "http://resource");
    }

    #[test]
    fn test_yaml_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrsrv.yaml");
        std::fs::write(&path, "local_store:\n  url: \"http://store\"\n").unwrap();

        let figment = Figment::from(Serialized::defaults(VrsrvConfig::default()))
            .merge(Yaml::file(&path));
        let config = VrsrvConfig::from_figment(figment).unwrap();
        assert_eq!(config.local_store.url, "http://store");
    }
}
