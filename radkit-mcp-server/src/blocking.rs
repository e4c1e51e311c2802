//! Bridge from the event loop to the blocking worker pool
//!
//! Every remote-service call goes through [`BlockingBridge::run`]. Work runs
//! on tokio's blocking pool, gated by a semaphore so at most `max_workers`
//! calls are in flight. The deadline starts once a worker slot is granted. A
//! call that outlives it is reported as [`FleetError::RemoteTimeout`]; its
//! worker keeps its permit until the closure returns, so a hung call costs
//! exactly one slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::fleet::FleetError;

#[derive(Debug, Clone)]
pub struct BlockingBridge {
    permits: Arc<Semaphore>,
    max_workers: usize,
    call_timeout: Duration,
}

impl BlockingBridge {
    pub fn new(max_workers: usize, call_timeout: Duration) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            call_timeout,
        }
    }

    /// Run `op` on a worker thread and return its result unchanged
    pub async fn run<T, F>(&self, op: F) -> Result<T, FleetError>
    where
        F: FnOnce() -> Result<T, FleetError> + Send + 'static,
        T: Send + 'static,
    {
        // Queueing for a worker does not count against the deadline
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FleetError::Internal("worker pool is closed".into()))?;

        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            op()
        });

        match tokio::time::timeout(self.call_timeout, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(error = %e, "Blocking worker failed");
                Err(FleetError::Internal(format!("worker failed: {}", e)))
            }
            Err(_) => {
                warn!(timeout = ?self.call_timeout, "Remote call exceeded deadline");
                Err(FleetError::RemoteTimeout(self.call_timeout))
            }
        }
    }

    /// Workers not currently running a call
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}
