//! radkit-mcp-utils: Common utilities shared across radkit-mcp crates
//!
//! This crate provides:
//! - Unified process-level error type ([`RadkitError`], [`Result`])
//! - Logging infrastructure ([`init_logging_with_config`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{RadkitError, Result};
pub use logging::{init_logging_with_config, LogConfig, LogOutput};

pub use paths::{config_dir, config_file, log_dir, state_dir};
