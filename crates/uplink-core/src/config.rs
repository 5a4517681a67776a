//! Gateway configuration loading.
//!
//! Priority, lowest first:
//! 1. Built-in defaults
//! 2. JSON file (explicit path, or `<config_dir>/uplink/config.json`)
//! 3. `UPLINK_*` environment variables

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use uplink_types::{ConfigError, GatewayConfig};

const CONFIG_DIR: &str = "uplink";
const CONFIG_FILE: &str = "config.json";

pub const ENV_BASE_URL: &str = "UPLINK_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "UPLINK_TIMEOUT_MS";
pub const ENV_RETRY_ATTEMPTS: &str = "UPLINK_RETRY_ATTEMPTS";
pub const ENV_CACHE_ENABLED: &str = "UPLINK_CACHE_ENABLED";
pub const ENV_CACHE_TTL_MS: &str = "UPLINK_CACHE_TTL_MS";

/// Default config file location, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load, apply environment overrides, and validate.
///
/// A missing explicit file is an error; a missing default file yields
/// the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            _ => {
                debug!("No config file found, using defaults");
                GatewayConfig::default()
            },
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.check()?;
    Ok(config)
}

pub fn read_config_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound { path: path.display().to_string() });
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::from_io_error(&e))?;
    let config: GatewayConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::from_json_error(&e))?;

    info!(path = %path.display(), "Loaded gateway config");
    Ok(config)
}

/// Apply `UPLINK_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base_url) = lookup(ENV_BASE_URL) {
        config.base_url = base_url;
    }
    if let Some(value) = lookup(ENV_TIMEOUT_MS) {
        config.timeout_ms = parse_env(ENV_TIMEOUT_MS, &value)?;
    }
    if let Some(value) = lookup(ENV_RETRY_ATTEMPTS) {
        config.retry_attempts = parse_env(ENV_RETRY_ATTEMPTS, &value)?;
    }
    if let Some(value) = lookup(ENV_CACHE_ENABLED) {
        config.cache_enabled = parse_bool(ENV_CACHE_ENABLED, &value)?;
    }
    if let Some(value) = lookup(ENV_CACHE_TTL_MS) {
        config.cache_ttl_ms = parse_env(ENV_CACHE_TTL_MS, &value)?;
    }
    Ok(())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::ValidationError {
        field: key.to_string(),
        message: format!("{} ({:?})", e, value),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ValidationError {
            field: key.to_string(),
            message: format!("expected a boolean, got {:?}", value),
        }),
    }
}
