//! Configuration loader
//!
//! Precedence, lowest first: built-in defaults, the TOML config file,
//! environment variables (including those loaded from `.env`).

use std::path::Path;
use std::str::FromStr;

use radkit_mcp_utils::{config_file, RadkitError, Result};

use super::{ServerConfig, TransportMode};

pub const ENV_USERNAME: &str = "RADKIT_SERVICE_USERNAME";
pub const ENV_ACCESS_CODE: &str = "RADKIT_SERVICE_CODE";
pub const ENV_BASE_URL: &str = "RADKIT_SERVICE_URL";
pub const ENV_CALL_TIMEOUT: &str = "RADKIT_CALL_TIMEOUT_SECS";
pub const ENV_MAX_WORKERS: &str = "RADKIT_MAX_WORKERS";
pub const ENV_TRANSPORT: &str = "MCP_TRANSPORT";
pub const ENV_HOST: &str = "MCP_HOST";
pub const ENV_PORT: &str = "MCP_PORT";

const MAX_WORKERS_LIMIT: usize = 64;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<ServerConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(ServerConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<ServerConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| RadkitError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<ServerConfig> {
        toml::from_str(content).map_err(|e| RadkitError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Override fields from the process environment
    pub fn apply_env(config: ServerConfig) -> Result<ServerConfig> {
        Self::apply_env_with(config, |key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`; blank values are ignored
    pub fn apply_env_with<F>(mut config: ServerConfig, lookup: F) -> Result<ServerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(username) = get(ENV_USERNAME) {
            config.service.username = username;
        }
        if let Some(access_code) = get(ENV_ACCESS_CODE) {
            config.service.access_code = access_code;
        }
        if let Some(base_url) = get(ENV_BASE_URL) {
            config.service.base_url = base_url;
        }
        if let Some(value) = get(ENV_CALL_TIMEOUT) {
            config.service.call_timeout_secs = parse_number(ENV_CALL_TIMEOUT, &value)?;
        }
        if let Some(value) = get(ENV_MAX_WORKERS) {
            config.service.max_workers = parse_number(ENV_MAX_WORKERS, &value)?;
        }
        if let Some(value) = get(ENV_TRANSPORT) {
            config.transport.mode = TransportMode::from_str(&value)?;
        }
        if let Some(host) = get(ENV_HOST) {
            config.transport.host = host;
        }
        if let Some(value) = get(ENV_PORT) {
            config.transport.port = parse_number(ENV_PORT, &value)?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(config: &ServerConfig) -> Result<()> {
        if config.service.username.trim().is_empty() {
            return Err(RadkitError::MissingSetting(ENV_USERNAME));
        }
        if config.service.access_code.trim().is_empty() {
            return Err(RadkitError::MissingSetting(ENV_ACCESS_CODE));
        }
        if config.service.base_url.trim().is_empty() {
            return Err(RadkitError::config("service base_url must not be empty"));
        }

        if config.service.call_timeout_secs < 1 {
            return Err(RadkitError::config("call_timeout_secs must be at least 1"));
        }

        if config.service.max_workers == 0 || config.service.max_workers > MAX_WORKERS_LIMIT {
            return Err(RadkitError::config(format!(
                "max_workers must be between 1 and {}",
                MAX_WORKERS_LIMIT
            )));
        }

        if config.transport.mode == TransportMode::Http && config.transport.host.trim().is_empty() {
            return Err(RadkitError::config("transport host must not be empty"));
        }

        Ok(())
    }

    /// Load, apply the environment, and validate
    pub fn load_and_validate() -> Result<ServerConfig> {
        let config = Self::apply_env(Self::load()?)?;
        Self::validate(&config)?;
        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RadkitError::config(format!("{} has invalid value '{}': {}", key, value, e)))
}
