use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poller::{PollConfigError, PollSettings};

/// Environment variable overriding `service.url`
pub const SERVICE_URL_ENV: &str = "SCIENCE_PORTAL_SERVICE_URL";

/// Environment variable overriding `service.token`
pub const TOKEN_ENV: &str = "SCIENCE_PORTAL_TOKEN";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub portal: PortalConfig,
}

/// Session service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the session service (required)
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<String>,
    /// Raw cookie header sent with every request
    #[serde(default)]
    pub cookie: Option<String>,
    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            cookie: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// Session state polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between session list checks
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    /// How long to wait for a new session to start running
    #[serde(default = "default_timeout")]
    pub running_timeout_ms: u64,
    /// How long to wait for a deleted session to leave the list
    #[serde(default = "default_timeout")]
    pub terminated_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            running_timeout_ms: default_timeout(),
            terminated_timeout_ms: default_timeout(),
        }
    }
}

fn default_interval() -> u64 {
    200
}

fn default_timeout() -> u64 {
    10_000
}

impl PollingConfig {
    pub fn running(&self) -> Result<PollSettings, PollConfigError> {
        PollSettings::from_timeout(
            Duration::from_millis(self.interval_ms),
            Duration::from_millis(self.running_timeout_ms),
        )
    }

    pub fn terminated(&self) -> Result<PollSettings, PollConfigError> {
        PollSettings::from_timeout(
            Duration::from_millis(self.interval_ms),
            Duration::from_millis(self.terminated_timeout_ms),
        )
    }
}

/// Portal presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Session type preselected on the launch form
    #[serde(default = "default_session_type")]
    pub default_session_type: String,
    /// Message shown above the session list
    #[serde(default)]
    pub banner_text: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            default_session_type: default_session_type(),
            banner_text: None,
        }
    }
}

fn default_session_type() -> String {
    "notebook".to_string()
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "science-portal", "SciencePortal")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from the default file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file (defaults if it doesn't exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;
            tracing::debug!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            tracing::debug!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Environment values take precedence over the file
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(SERVICE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.service.url = Some(url);
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.service.token = Some(token);
        }
    }

    /// The session service URL, which every backend command needs
    pub fn service_url(&self) -> Result<&str> {
        match self.service.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => {
                let path = Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.toml".to_string());
                anyhow::bail!(
                    "Configuration property service.url is missing (set it in {} or {})",
                    path,
                    SERVICE_URL_ENV
                )
            }
        }
    }
}
