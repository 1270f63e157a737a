//! Scripted mock actuator for engine and supervisor tests

use crate::workload::WorkloadActuator;
use crate::{ActuatorError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory actuator with scriptable failures and externally driven
/// running state and byte counter.
#[derive(Default)]
pub struct MockActuator {
    running: AtomicBool,
    bytes: AtomicU64,
    restarts: AtomicU32,
    last_concurrency: AtomicU32,
    fail_start: AtomicBool,
    fail_restart: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next start to fail
    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Script every restart to fail
    pub fn fail_restart(&self, fail: bool) {
        self.fail_restart.store(fail, Ordering::SeqCst);
    }

    /// Simulate the workload producing `n` more output bytes
    pub fn advance_output(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::SeqCst);
    }

    /// Simulate an unexpected workload exit (or revival)
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Number of restarts applied
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Concurrency passed to the most recent start/restart
    pub fn last_concurrency(&self) -> u32 {
        self.last_concurrency.load(Ordering::SeqCst)
    }

    /// Ordered record of lifecycle calls
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl WorkloadActuator for MockActuator {
    async fn start(&self, _command: &str, concurrency: u32) -> Result<()> {
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(ActuatorError::Spawn("scripted start failure".to_string()));
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(ActuatorError::AlreadyStarted);
        }
        self.record(format!("start:{concurrency}"));
        self.last_concurrency.store(concurrency, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.record("pause");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ActuatorError::AlreadyRunning);
        }
        self.record("resume");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn update_parameters(&self, concurrency: u32) -> Result<()> {
        if concurrency == 0 {
            return Err(ActuatorError::InvalidParameter(
                "concurrency must be positive".to_string(),
            ));
        }
        self.last_concurrency.store(concurrency, Ordering::SeqCst);
        Ok(())
    }

    async fn restart(&self, concurrency: u32) -> Result<()> {
        if self.fail_restart.load(Ordering::SeqCst) {
            return Err(ActuatorError::Spawn("scripted restart failure".to_string()));
        }
        self.record(format!("restart:{concurrency}"));
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.last_concurrency.store(concurrency, Ordering::SeqCst);
        self.bytes.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn output_bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn pid(&self) -> Option<u32> {
        if self.running.load(Ordering::SeqCst) {
            Some(4242)
        } else {
            None
        }
    }
}
