//! Configuration loading and management.
//!
//! Loads configuration from embedded config.toml (or the file named by `AAD_CONFIG_FILE`)
//! with environment variable overrides.

use crate::auth::endpoints::TokenVersion;
use crate::error::ConfigError;
use crate::secret::SecureString;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Environment variable naming an external configuration file.
const CONFIG_FILE_ENV: &str = "AAD_CONFIG_FILE";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub local_users: LocalUsersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Azure AD application registration and tenant settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_login_service")]
    pub login_service: String,
    #[serde(default)]
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: SecureString,
    pub callback_url: String,
    /// Raw selector; only 1 and 2 are accepted by [`Config::validate`].
    #[serde(default = "default_token_version")]
    pub token_version: u8,
    #[serde(default = "default_username_claim")]
    pub username_claim: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
}

/// ID token handling.
///
/// Signature verification is never performed: `skip_signature_verification`
/// defaults to `true` and is insecure by default. It exists so the behaviour is
/// visible in configuration rather than implied.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_true")]
    pub skip_signature_verification: bool,
    #[serde(default = "default_true")]
    pub validate_audience: bool,
    /// Log the full decoded claim set at WARN. Claims carry personal data.
    #[serde(default = "default_true")]
    pub log_claims: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_callback_timeout_seconds")]
    pub callback_timeout_seconds: u64,
}

/// Microsoft Graph directory enrichment.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub enrich_identity: bool,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_graph_scope")]
    pub scope: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalUsersConfig {
    /// Require a matching local system account for every login.
    #[serde(default)]
    pub enabled: bool,
    /// Create the account when it is missing instead of rejecting the login.
    #[serde(default)]
    pub create_system_users: bool,
    #[serde(default = "default_add_user_cmd")]
    pub add_user_cmd: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_login_service() -> String {
    "Azure AD".to_string()
}

fn default_token_version() -> u8 {
    1
}

fn default_username_claim() -> String {
    "name".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string()]
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_callback_timeout_seconds() -> u64 {
    300
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_graph_scope() -> String {
    "https://graph.microsoft.com/.default".to_string()
}

fn default_add_user_cmd() -> Vec<String> {
    ["adduser", "-q", "--gecos", "", "--disabled-password"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            skip_signature_verification: true,
            validate_audience: true,
            log_claims: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            callback_timeout_seconds: default_callback_timeout_seconds(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_seconds)
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enrich_identity: false,
            graph_base_url: default_graph_base_url(),
            scope: default_graph_scope(),
        }
    }
}

impl Default for LocalUsersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            create_system_users: false,
            add_user_cmd: default_add_user_cmd(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with environment variable overrides, then validate it.
    ///
    /// Reads the file named by `AAD_CONFIG_FILE` when set, the embedded config.toml otherwise.
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_FILE_ENV) {
            Ok(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("Failed to parse config file {}", path))?
            }
            Err(_) => {
                Self::from_toml_str(CONFIG_TOML).context("Failed to parse embedded config.toml")?
            }
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration without applying overrides or validating.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(login_service) = lookup("LOGIN_SERVICE") {
            self.provider.login_service = login_service;
        }

        if let Some(tenant_id) = lookup("AAD_TENANT_ID") {
            self.provider.tenant_id = tenant_id;
        }

        if let Some(client_id) = lookup("AAD_CLIENT_ID") {
            self.provider.client_id = client_id;
        }

        if let Some(client_secret) = lookup("AAD_CLIENT_SECRET") {
            self.provider.client_secret = SecureString::new(client_secret);
        }

        if let Some(callback_url) = lookup("AAD_CALLBACK_URL") {
            self.provider.callback_url = callback_url;
        }

        if let Some(claim) = lookup("AAD_USERNAME_CLAIM") {
            self.provider.username_claim = claim;
        }

        if let Some(version) = lookup("AAD_TOKEN_VERSION") {
            self.provider.token_version = version
                .trim()
                .parse()
                .map_err(|_| ConfigError::UnparsableTokenVersion(version.clone()))?;
        }

        Ok(())
    }

    /// Validate that required configuration is present and consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = &self.provider;

        if provider.tenant_id.is_empty() || provider.tenant_id == "YOUR_TENANT_ID" {
            return Err(ConfigError::MissingTenant);
        }

        if provider.client_id.is_empty() || provider.client_id == "YOUR_AZURE_AD_CLIENT_ID" {
            return Err(ConfigError::MissingClientId);
        }

        if provider.client_secret.is_empty() {
            return Err(ConfigError::MissingClientSecret);
        }

        url::Url::parse(&provider.callback_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("callback_url: {}", e)))?;

        TokenVersion::try_from(provider.token_version)?;

        if provider.username_claim.is_empty() {
            return Err(ConfigError::MissingUsernameClaim);
        }

        if !self.security.skip_signature_verification {
            return Err(ConfigError::SignatureVerificationUnsupported);
        }

        Ok(())
    }
}
