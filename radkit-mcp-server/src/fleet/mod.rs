//! Remote fleet-management service boundary
//!
//! The service SDK is synchronous: every method on [`FleetConnector`] and
//! [`FleetSession`] may block on network IO and must only be called through
//! [`crate::blocking::BlockingBridge`].

mod error;
pub mod http;

pub use error::FleetError;
pub use http::HttpConnector;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity used to open a session with the remote service
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Client identity (usually an email address)
    pub username: String,
    /// Service serial / access code identifying the target service
    pub access_code: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, access_code: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_code: access_code.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("access_code", &"<redacted>")
            .finish()
    }
}

/// A device as onboarded in the remote inventory
///
/// Field order is the serialized key order of `get_device_attributes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub terminal_config: bool,
    #[serde(default)]
    pub netconf_config: bool,
    #[serde(default)]
    pub snmp_version: bool,
    #[serde(default)]
    pub swagger_config: bool,
    #[serde(default)]
    pub http_config: bool,
    #[serde(default)]
    pub forwarded_tcp_ports: String,
    /// Kept in the order the service reports them
    #[serde(default)]
    pub terminal_capabilities: Vec<String>,
}

impl DeviceRecord {
    /// Record with only a name; remaining attributes take their defaults
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: String::new(),
            device_type: String::new(),
            description: String::new(),
            terminal_config: false,
            netconf_config: false,
            snmp_version: false,
            swagger_config: false,
            http_config: false,
            forwarded_tcp_ports: String::new(),
            terminal_capabilities: Vec::new(),
        }
    }
}

/// Response to one submitted command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub command: String,
    pub data: String,
}

/// Shape of an exec result, resolved once at the SDK boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// One aggregate response for the whole submission
    Single(String),
    /// Per-command responses in submission order
    PerCommand(Vec<CommandOutput>),
}

/// Opens sessions against the remote service
pub trait FleetConnector: Send + Sync + 'static {
    type Session: FleetSession;

    /// Authenticate and open a new session. Blocking.
    fn connect(&self, credentials: &Credentials) -> Result<Self::Session, FleetError>;
}

/// A live, authenticated session. All methods block.
pub trait FleetSession: Send + Sync + 'static {
    /// Fetch every onboarded device
    fn inventory(&self) -> Result<Vec<DeviceRecord>, FleetError>;

    /// Fetch a single device, or `DeviceNotFound`
    fn device(&self, name: &str) -> Result<DeviceRecord, FleetError>;

    /// Run `commands` sequentially on `device` and wait for completion
    fn exec(&self, device: &str, commands: &[String]) -> Result<ExecOutcome, FleetError>;

    /// Tear the session down on the service side
    fn close(&self) -> Result<(), FleetError>;
}
