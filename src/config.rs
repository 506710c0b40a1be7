use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Background refresh interval in minutes, 0 disables it
    #[serde(default)]
    pub refresh_interval: u64,
    /// Outbound request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Return password reset tokens in the API response (no mail transport)
    #[serde(default)]
    pub expose_reset_tokens: bool,
    #[serde(default = "ProviderConfig::newsapi")]
    pub newsapi: ProviderConfig,
    #[serde(default = "ProviderConfig::guardian")]
    pub guardian: ProviderConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite:newsdesk.db?mode=rwc".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    50
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl ProviderConfig {
    pub fn newsapi() -> Self {
        Self {
            api_key: None,
            base_url: "https://newsapi.org/v2".to_string(),
            page_size: default_page_size(),
        }
    }

    pub fn guardian() -> Self {
        Self {
            api_key: None,
            base_url: "https://content.guardianapis.com".to_string(),
            page_size: default_page_size(),
        }
    }

    /// The configured key, treating a blank value as missing.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            database_url: default_database_url(),
            refresh_interval: 0,
            request_timeout: default_request_timeout(),
            expose_reset_tokens: false,
            newsapi: ProviderConfig::newsapi(),
            guardian: ProviderConfig::guardian(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `DATABASE_URL`, `NEWSAPI_KEY` and `GUARDIAN_API_KEY` on top of the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(key) = lookup("NEWSAPI_KEY") {
            self.newsapi.api_key = Some(key);
        }
        if let Some(key) = lookup("GUARDIAN_API_KEY") {
            self.guardian.api_key = Some(key);
        }
        self
    }
}
