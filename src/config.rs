//! Configuration management for the Sofia proxy.
//!
//! Loads settings from `~/.config/sofia-proxy/config.toml` with environment
//! overrides. The Claude API key is the one secret: it lives in the
//! `CLAUDE_API_KEY` environment variable (or the config file for fixed
//! deployments) and must never reach a response body or log line.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the provider credential.
pub const CLAUDE_API_KEY_ENV: &str = "CLAUDE_API_KEY";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub api_keys: ApiKeysConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upstream Claude API endpoint settings. `base_url` is overridable so tests
/// can point the relay at a local mock server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub claude: Option<String>,
}

// Default value functions
fn default_port() -> u16 {
    8787
}
fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_api_version() -> String {
    "2023-06-01".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            version: default_api_version(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sofia-proxy")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(CLAUDE_API_KEY_ENV) {
            self.api_keys.claude = Some(key);
        }
        if let Ok(url) = std::env::var("SOFIA_PROVIDER_URL") {
            self.provider.base_url = url;
        }
        self
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Credential source
// ============================================================================

/// Where the relay obtains the provider credential. Injected so the handler
/// can be unit-tested with a fixed key instead of mutating process
/// environment.
pub trait CredentialSource: Send + Sync {
    /// Return the API key, or `None` when not configured. Empty strings count
    /// as not configured.
    fn api_key(&self) -> Option<String>;
}

/// Reads `CLAUDE_API_KEY` from the process environment on every call, so a
/// redeployed configuration takes effect without a restart. Falls back to the
/// key from the config file when the variable is unset.
pub struct EnvCredentials {
    fallback: Option<String>,
}

impl EnvCredentials {
    pub fn new(fallback: Option<String>) -> Self {
        Self { fallback }
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        match std::env::var(CLAUDE_API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Some(key),
            _ => self.fallback.clone().filter(|k| !k.is_empty()),
        }
    }
}

/// A fixed credential, for deployments that keep the key in the config file
/// and for tests.
pub struct StaticCredentials {
    key: Option<String>,
}

impl StaticCredentials {
    pub fn new(key: Option<String>) -> Self {
        Self { key }
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        self.key.clone().filter(|k| !k.is_empty())
    }
}
