//! Error types for radkit-mcp
//!
//! Process-level failures: configuration, logging setup and filesystem IO.
//! Remote-service failures live in the server crate.

use std::path::PathBuf;

/// Main error type for radkit-mcp process setup
#[derive(Debug, thiserror::Error)]
pub enum RadkitError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Missing required setting {0}")]
    MissingSetting(&'static str),

    // === Transport Errors ===

    #[error("Transport error: {0}")]
    Transport(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RadkitError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error comes from user-supplied configuration
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::ConfigInvalid { .. } | Self::MissingSetting(_)
        )
    }
}

/// Result type alias using RadkitError
pub type Result<T> = std::result::Result<T, RadkitError>;
