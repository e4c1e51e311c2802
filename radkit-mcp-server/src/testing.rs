//! In-memory fleet service for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::fleet::{
    CommandOutput, Credentials, DeviceRecord, ExecOutcome, FleetConnector, FleetError,
    FleetSession,
};

#[derive(Default)]
struct FleetState {
    devices: Mutex<Vec<DeviceRecord>>,
    exec_outcomes: Mutex<HashMap<String, ExecOutcome>>,
    denied: Mutex<HashSet<String>>,
    exec_log: Mutex<Vec<(String, Vec<String>)>>,
    connect_delay: Mutex<Duration>,
    inventory_delay: Mutex<Duration>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    failures_remaining: AtomicUsize,
}

/// Shared fake service; clones observe the same counters
#[derive(Clone, Default)]
pub struct FakeFleet {
    state: Arc<FleetState>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, record: DeviceRecord) -> Self {
        self.state.devices.lock().push(record);
        self
    }

    pub fn with_exec(self, device: &str, outcome: ExecOutcome) -> Self {
        self.state.exec_outcomes.lock().insert(device.to_string(), outcome);
        self
    }

    pub fn deny(self, device: &str) -> Self {
        self.state.denied.lock().insert(device.to_string());
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.set_connect_delay(delay);
        self
    }

    /// Applies to connects that start after this call
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    pub fn set_inventory_delay(&self, delay: Duration) {
        *self.state.inventory_delay.lock() = delay;
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector { fleet: self.clone() }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn exec_log(&self) -> Vec<(String, Vec<String>)> {
        self.state.exec_log.lock().clone()
    }
}

pub struct FakeConnector {
    fleet: FakeFleet,
}

impl FleetConnector for FakeConnector {
    type Session = FakeSession;

    fn connect(&self, _credentials: &Credentials) -> Result<FakeSession, FleetError> {
        let state = &self.fleet.state;
        let id = state.connects.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *state.connect_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let failing = state
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FleetError::connection("service unreachable"));
        }

        Ok(FakeSession {
            id,
            fleet: self.fleet.clone(),
        })
    }
}

pub struct FakeSession {
    pub id: usize,
    fleet: FakeFleet,
}

impl FakeSession {
    fn require_device(&self, name: &str) -> Result<DeviceRecord, FleetError> {
        self.fleet
            .state
            .devices
            .lock()
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| FleetError::DeviceNotFound(name.to_string()))
    }
}

impl FleetSession for FakeSession {
    fn inventory(&self) -> Result<Vec<DeviceRecord>, FleetError> {
        let delay = *self.fleet.state.inventory_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(self.fleet.state.devices.lock().clone())
    }

    fn device(&self, name: &str) -> Result<DeviceRecord, FleetError> {
        self.require_device(name)
    }

    fn exec(&self, device: &str, commands: &[String]) -> Result<ExecOutcome, FleetError> {
        self.require_device(device)?;
        if self.fleet.state.denied.lock().contains(device) {
            return Err(FleetError::AccessDenied("Access denied".into()));
        }

        self.fleet
            .state
            .exec_log
            .lock()
            .push((device.to_string(), commands.to_vec()));

        if let Some(outcome) = self.fleet.state.exec_outcomes.lock().get(device) {
            return Ok(outcome.clone());
        }

        Ok(ExecOutcome::PerCommand(
            commands
                .iter()
                .map(|command| CommandOutput {
                    command: command.clone(),
                    data: format!("{}#{}", device, command),
                })
                .collect(),
        ))
    }

    fn close(&self) -> Result<(), FleetError> {
        self.fleet.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Record resembling a Catalyst switch onboarded in the inventory
pub fn ios_xe_device(name: &str, host: &str) -> DeviceRecord {
    DeviceRecord {
        host: host.to_string(),
        device_type: "IOS_XE".into(),
        terminal_config: true,
        terminal_capabilities: vec![
            "DOWNLOAD".into(),
            "INTERACTIVE".into(),
            "EXEC".into(),
            "UPLOAD".into(),
        ],
        ..DeviceRecord::named(name)
    }
}

pub fn test_credentials() -> Credentials {
    Credentials::new("ops@example.com", "abcd-1234-efgh")
}
