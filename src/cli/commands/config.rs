//! Configuration management commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{OutputFormat, print_formatted};
use crate::config::Config;

/// Shown instead of credentials
const HIDDEN: &str = "<hidden>";

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Get a specific config value
    Get {
        /// Config key (e.g., "service.url", "polling.interval_ms")
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., "service.url", "polling.interval_ms")
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}

#[derive(Serialize)]
struct ConfigPathResult {
    path: String,
    exists: bool,
}

pub async fn run(command: ConfigCommands, format: OutputFormat) -> Result<()> {
    match command {
        ConfigCommands::Show => show(format),
        ConfigCommands::Get { key } => get(&key, format),
        ConfigCommands::Set { key, value } => set(&key, &value),
        ConfigCommands::Path => path(format),
    }
}

fn show(format: OutputFormat) -> Result<()> {
    let config = redacted(Config::load()?);

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

/// Replace credentials so they never reach the terminal
fn redacted(mut config: Config) -> Config {
    if config.service.token.is_some() {
        config.service.token = Some(HIDDEN.to_string());
    }
    if config.service.cookie.is_some() {
        config.service.cookie = Some(HIDDEN.to_string());
    }
    config
}

fn get(key: &str, format: OutputFormat) -> Result<()> {
    let config = redacted(Config::load()?);
    let value = get_config_value(&config, key)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&value)?);
        }
        OutputFormat::Text => {
            println!("{}", value);
        }
    }

    Ok(())
}

fn or_unset(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "<not set>".to_string())
}

fn get_config_value(config: &Config, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["service", "url"] => Ok(or_unset(&config.service.url)),
        ["service", "token"] => Ok(or_unset(&config.service.token)),
        ["service", "cookie"] => Ok(or_unset(&config.service.cookie)),
        ["service", "request_timeout_secs"] => Ok(config.service.request_timeout_secs.to_string()),
        ["polling", "interval_ms"] => Ok(config.polling.interval_ms.to_string()),
        ["polling", "running_timeout_ms"] => Ok(config.polling.running_timeout_ms.to_string()),
        ["polling", "terminated_timeout_ms"] => {
            Ok(config.polling.terminated_timeout_ms.to_string())
        }
        ["portal", "default_session_type"] => Ok(config.portal.default_session_type.clone()),
        ["portal", "banner_text"] => Ok(or_unset(&config.portal.banner_text)),
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
}

fn set(key: &str, value: &str) -> Result<()> {
    // Edit the file alone so environment overrides aren't written back
    let path = Config::config_path()?;
    let mut config = Config::load_from(&path)?;

    set_config_value(&mut config, key, value)?;
    config.save_to(&path)?;

    let shown = if key.starts_with("service.token") || key.starts_with("service.cookie") {
        HIDDEN
    } else {
        value
    };
    println!("Set {} = {}", key, shown);
    Ok(())
}

/// Empty strings clear optional values
fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["service", "url"] => {
            config.service.url = optional(value);
        }
        ["service", "token"] => {
            config.service.token = optional(value);
        }
        ["service", "cookie"] => {
            config.service.cookie = optional(value);
        }
        ["service", "request_timeout_secs"] => {
            config.service.request_timeout_secs = value.parse()?;
        }
        ["polling", "interval_ms"] => {
            config.polling.interval_ms = value.parse()?;
            config.polling.running()?;
        }
        ["polling", "running_timeout_ms"] => {
            config.polling.running_timeout_ms = value.parse()?;
        }
        ["polling", "terminated_timeout_ms"] => {
            config.polling.terminated_timeout_ms = value.parse()?;
        }
        ["portal", "default_session_type"] => {
            config.portal.default_session_type = value.trim().to_lowercase();
        }
        ["portal", "banner_text"] => {
            config.portal.banner_text = optional(value);
        }
        _ => anyhow::bail!("Unknown or read-only config key: {}", key),
    }

    Ok(())
}

fn path(format: OutputFormat) -> Result<()> {
    let path = Config::config_path()?;
    let exists = path.exists();

    let result = ConfigPathResult {
        path: path.to_string_lossy().to_string(),
        exists,
    };

    print_formatted(&result, format, |r| {
        format!("{}{}", r.path, if r.exists { "" } else { " (not found)" })
    });

    Ok(())
}
