//! Relay configuration loaded from an optional TOML file
//!
//! Every field has a default, so an absent or partial file yields a working
//! service. The ordered model lists and safety settings live here as data so
//! they can be changed without touching the dispatch logic.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;
use crate::providers::types::{GenerationConfig, SafetySetting};

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Environment variable holding the process-wide fallback key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Text returned by `GET /`
    #[serde(default = "default_banner")]
    pub banner: String,
    /// System instruction used when a request omits one
    #[serde(default = "default_system_instruction")]
    pub default_system_instruction: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default = "default_safety")]
    pub safety: Vec<SafetySetting>,
}

/// HTTP bind address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Provider endpoint and model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Model tried first on every request
    #[serde(default = "default_preferred_model")]
    pub preferred_model: String,
    /// Models tried in order by the plain REST fallback
    #[serde(default = "default_rest_fallback_models")]
    pub rest_fallback_models: Vec<String>,
    /// Whether to enumerate models for the credential after a failure
    #[serde(default = "default_true")]
    pub discovery: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_banner() -> String {
    "gemrelay AI service online".to_string()
}
fn default_system_instruction() -> String {
    "You are a helpful assistant.".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_api_version() -> String {
    "v1beta".to_string()
}
fn default_preferred_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_rest_fallback_models() -> Vec<String> {
    vec![
        "gemini-1.5-flash".to_string(),
        "gemini-1.5-pro".to_string(),
        "gemini-pro".to_string(),
    ]
}
fn default_true() -> bool {
    true
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_safety() -> Vec<SafetySetting> {
    SafetySetting::block_medium_and_above()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            banner: default_banner(),
            default_system_instruction: default_system_instruction(),
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            generation: GenerationConfig::default(),
            safety: default_safety(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            preferred_model: default_preferred_model(),
            rest_fallback_models: default_rest_fallback_models(),
            discovery: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, failing if it cannot be read
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    /// Load from `path` when given, else `~/.gemrelay/config.toml` when it
    /// exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            return Self::load(p);
        }
        match Self::default_path() {
            Some(p) if p.exists() => Self::load(&p),
            _ => Ok(Self::default()),
        }
    }

    /// `~/.gemrelay/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".gemrelay").join("config.toml"))
    }

    /// Read the process-wide fallback key from the configured env var.
    /// Blank values count as absent.
    pub fn fallback_key_from_env(&self) -> Option<String> {
        Self::fallback_key_from(std::env::var(&self.api_key_env).ok())
    }

    /// Normalise a raw fallback key value: trimmed, blank counts as absent
    pub fn fallback_key_from(value: Option<String>) -> Option<String> {
        value
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.provider.preferred_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "provider.preferred_model must not be empty".into(),
            ));
        }
        if self.provider.rest_fallback_models.is_empty() {
            return Err(ConfigError::Invalid(
                "provider.rest_fallback_models must list at least one model".into(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provider.request_timeout_secs must be non-zero".into(),
            ));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::Invalid("api_key_env must not be empty".into()));
        }
        Ok(())
    }
}
