//! Configuration schema structs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use radkit_mcp_utils::RadkitError;
use serde::{Deserialize, Serialize};

use crate::fleet::Credentials;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
}

/// Remote service connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Client identity (usually an email address)
    pub username: String,
    /// Service serial identifying the target service
    pub access_code: String,
    /// REST API root of the remote service
    pub base_url: String,
    /// Deadline for any single remote call
    pub call_timeout_secs: u64,
    /// Upper bound on concurrent blocking remote calls
    pub max_workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            access_code: String::new(),
            base_url: "https://prod.radkit-cloud.cisco.com/api/v1".into(),
            call_timeout_secs: 120,
            max_workers: 8,
        }
    }
}

impl ServiceConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.access_code.clone())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("username", &self.username)
            .field("access_code", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("max_workers", &self.max_workers)
            .finish()
    }
}

/// How MCP clients reach the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Newline-delimited JSON-RPC on stdin/stdout
    #[default]
    Stdio,
    /// JSON-RPC over HTTP POST
    #[serde(alias = "https", alias = "sse")]
    Http,
}

impl FromStr for TransportMode {
    type Err = RadkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" | "https" | "sse" => Ok(Self::Http),
            other => Err(RadkitError::config(format!(
                "unknown transport '{}' (expected stdio or https)",
                other
            ))),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// Transport settings; host and port only apply to network mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    pub host: String,
    pub port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stdio,
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl TransportConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
