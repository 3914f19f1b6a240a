use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AuthError;

const PLACEHOLDER_DOMAIN: &str = "your-domain.auth0.com";
const PLACEHOLDER_CLIENT_ID: &str = "your-client-id";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub audience: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub token_dir: Option<PathBuf>,
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("STREAMIT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let settings = Config::builder()
            .add_source(File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("STREAMIT").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Settings for a provider at `domain`, everything else defaulted.
    pub fn for_provider(domain: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            audience: None,
            scope: default_scope(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            token_dir: None,
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        let domain = self.domain.trim();
        if domain.is_empty() || domain == PLACEHOLDER_DOMAIN {
            return Err(AuthError::Configuration(
                "domain is not configured; set STREAMIT__DOMAIN or `domain` in config.toml"
                    .to_string(),
            ));
        }
        let client_id = self.client_id.trim();
        if client_id.is_empty() || client_id == PLACEHOLDER_CLIENT_ID {
            return Err(AuthError::Configuration(
                "client_id is not configured; set STREAMIT__CLIENT_ID or `client_id` in config.toml"
                    .to_string(),
            ));
        }
        if domain.contains("://")
            && !(domain.starts_with("http://") || domain.starts_with("https://"))
        {
            return Err(AuthError::Configuration(
                "domain must be a bare host or an HTTP(S) URL".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL of the provider, without a trailing slash.
    pub fn provider_url(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
