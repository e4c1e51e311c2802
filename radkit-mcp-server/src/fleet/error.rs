//! Remote fleet service error taxonomy

use std::time::Duration;

/// Failures surfaced by the remote service, the blocking bridge and the
/// session lifecycle.
///
/// Values are `Clone` so a single failed connection attempt can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FleetError {
    /// Could not establish a session; the next call may retry
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// The session manager was shut down
    #[error("Session closed: the remote service session has been shut down")]
    SessionClosed,

    /// Target device is not onboarded in the inventory
    #[error("Device not found in inventory: {0}")]
    DeviceNotFound(String),

    /// RBAC rejection for a specific device or command
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Bridge-enforced deadline exceeded
    #[error("Remote call timed out after {0:?}")]
    RemoteTimeout(Duration),

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other failure reported by the remote service
    #[error("Remote service error: {0}")]
    Remote(String),

    /// Internal error (worker panic, closed pool)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Create a remote error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a connection failure
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailure(msg.into())
    }

    /// Check if a later call may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailure(_) | Self::RemoteTimeout(_))
    }

    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailure(_) => "connection_failure",
            Self::SessionClosed => "session_closed",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::RemoteTimeout(_) => "remote_timeout",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Remote(_) => "remote",
            Self::Internal(_) => "internal",
        }
    }
}
