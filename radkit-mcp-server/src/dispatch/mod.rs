//! Tool handlers backed by the remote session
//!
//! Each handler acquires the session through the [`SessionManager`], runs a
//! single blocking remote call through the [`BlockingBridge`] and shapes the
//! result. Errors are classified and annotated here, never swallowed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::blocking::BlockingBridge;
use crate::fleet::{DeviceRecord, ExecOutcome, FleetConnector, FleetError, FleetSession};
use crate::session::SessionManager;

/// Appended to RBAC rejections so the caller knows where to look
pub const RBAC_GUIDANCE: &str = "RBAC is enabled on the remote service and the identity this \
server was onboarded with is not allowed on this device, most likely because it is missing the \
appropriate RBAC tag. Grant it permissions in the remote service; this is not a connectivity problem.";

pub struct ToolDispatcher<C: FleetConnector> {
    sessions: Arc<SessionManager<C>>,
    bridge: BlockingBridge,
}

impl<C: FleetConnector> ToolDispatcher<C> {
    pub fn new(sessions: Arc<SessionManager<C>>, bridge: BlockingBridge) -> Self {
        Self { sessions, bridge }
    }

    pub fn sessions(&self) -> &Arc<SessionManager<C>> {
        &self.sessions
    }

    pub fn bridge(&self) -> &BlockingBridge {
        &self.bridge
    }

    /// Names of every onboarded device; duplicates collapse
    pub async fn list_inventory_names(&self) -> Result<BTreeSet<String>, FleetError> {
        let started = Instant::now();
        let session = self.sessions.acquire_session().await?;

        let devices = self
            .bridge
            .run(move || session.inventory())
            .await
            .map_err(annotate)?;

        let names: BTreeSet<String> = devices.into_iter().map(|d| d.name).collect();
        debug!(count = names.len(), elapsed = ?started.elapsed(), "Listed inventory");
        Ok(names)
    }

    /// Attributes of exactly one device
    pub async fn get_device_attributes(&self, target_device: &str) -> Result<DeviceRecord, FleetError> {
        let target = require_device_name(target_device)?;
        let started = Instant::now();
        let session = self.sessions.acquire_session().await?;

        let record = self
            .bridge
            .run({
                let target = target.clone();
                move || session.device(&target)
            })
            .await
            .map_err(annotate)?;

        debug!(device = %target, elapsed = ?started.elapsed(), "Fetched device attributes");
        Ok(record)
    }

    /// Run `commands` in order on one device and return the combined output
    pub async fn exec_commands(
        &self,
        target_device: &str,
        commands: Vec<String>,
    ) -> Result<String, FleetError> {
        let target = require_device_name(target_device)?;
        if commands.is_empty() {
            return Err(FleetError::InvalidArgument(
                "at least one CLI command is required".into(),
            ));
        }

        let started = Instant::now();
        let session = self.sessions.acquire_session().await?;
        let count = commands.len();

        let outcome = self
            .bridge
            .run({
                let target = target.clone();
                move || session.exec(&target, &commands)
            })
            .await
            .map_err(annotate)?;

        debug!(
            device = %target,
            commands = count,
            elapsed = ?started.elapsed(),
            "Executed CLI commands"
        );
        Ok(render_exec(outcome))
    }
}

fn require_device_name(target_device: &str) -> Result<String, FleetError> {
    let target = target_device.trim();
    if target.is_empty() {
        return Err(FleetError::InvalidArgument(
            "target_device must be a non-empty device name".into(),
        ));
    }
    Ok(target.to_string())
}

/// Attach remediation guidance to RBAC rejections
fn annotate(err: FleetError) -> FleetError {
    match err {
        FleetError::AccessDenied(msg) => {
            warn!(reason = %msg, "Remote service denied access");
            FleetError::AccessDenied(format!("{}. {}", msg.trim_end_matches('.'), RBAC_GUIDANCE))
        }
        other => other,
    }
}

/// Render device names as a brace-delimited set: `{"p0-2e", "p1-2e"}`
pub fn render_names(names: &BTreeSet<String>) -> String {
    let quoted: Vec<String> = names
        .iter()
        .map(|name| serde_json::Value::String(name.clone()).to_string())
        .collect();
    format!("{{{}}}", quoted.join(", "))
}

/// Serialize a record as a JSON object with the fixed key order
pub fn render_attributes(record: &DeviceRecord) -> Result<String, FleetError> {
    serde_json::to_string(record)
        .map_err(|e| FleetError::Internal(format!("failed to serialize device record: {}", e)))
}

/// Single results pass through; per-command results join with newlines
pub fn render_exec(outcome: ExecOutcome) -> String {
    match outcome {
        ExecOutcome::Single(text) => text,
        ExecOutcome::PerCommand(outputs) => outputs
            .into_iter()
            .map(|output| output.data)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
