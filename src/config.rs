use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding [`ClientConfig::asset_gateway_url`].
pub const ASSET_GATEWAY_ENV: &str = "ESTATE_ASSET_GATEWAY_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse client config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid client config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Base URL asset identifiers are appended to, e.g. an IPFS gateway.
    #[serde(default = "default_asset_gateway_url")]
    pub asset_gateway_url: String,
    #[serde(default = "default_pinning_endpoint")]
    pub pinning_endpoint: String,
    #[serde(default)]
    pub pinning_api_key: String,
    #[serde(default)]
    pub pinning_secret_api_key: String,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_asset_gateway_url() -> String {
    "https://gateway.pinata.cloud/ipfs/".to_string()
}

fn default_pinning_endpoint() -> String {
    "https://api.pinata.cloud/pinning/pinFileToIPFS".to_string()
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            asset_gateway_url: default_asset_gateway_url(),
            pinning_endpoint: default_pinning_endpoint(),
            pinning_api_key: String::new(),
            pinning_secret_api_key: String::new(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies [`ASSET_GATEWAY_ENV`] when it is set to a non-empty value.
    pub fn with_env_overrides(self) -> Self {
        self.with_gateway_override(std::env::var(ASSET_GATEWAY_ENV).ok())
    }

    pub fn with_gateway_override(mut self, gateway_url: Option<String>) -> Self {
        if let Some(url) = gateway_url.filter(|url| !url.trim().is_empty()) {
            self.asset_gateway_url = url.trim().to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.asset_gateway_url) {
            return Err(ConfigError::Invalid(format!(
                "asset_gateway_url must be an http(s) URL, got `{}`",
                self.asset_gateway_url
            )));
        }
        if !is_http_url(&self.pinning_endpoint) {
            return Err(ConfigError::Invalid(format!(
                "pinning_endpoint must be an http(s) URL, got `{}`",
                self.pinning_endpoint
            )));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "confirmation_timeout_secs must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub(crate) fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}
