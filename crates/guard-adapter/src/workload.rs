//! The engine-facing workload control contract
//!
//! Kept small and stable so alternate runtimes can be swapped behind it and
//! tests can drive the engine with a scripted fake.

use crate::Result;
use async_trait::async_trait;

/// Workload lifecycle and metering surface driven by the control engine
#[async_trait]
pub trait WorkloadActuator: Send + Sync {
    /// Launch the workload at the given concurrency.
    ///
    /// Fails with [`crate::ActuatorError::AlreadyStarted`] when a child is
    /// already live; at most one child exists per actuator instance.
    async fn start(&self, command: &str, concurrency: u32) -> Result<()>;

    /// Stop the workload while preserving the configured command so
    /// [`WorkloadActuator::resume`] can relaunch it.
    async fn pause(&self) -> Result<()>;

    /// Relaunch the workload with the last command and concurrency
    async fn resume(&self) -> Result<()>;

    /// Record a new concurrency for the next (re)start without restarting
    async fn update_parameters(&self, concurrency: u32) -> Result<()>;

    /// Stop then start the workload at `concurrency` in one atomic section.
    /// A zero concurrency reuses the previous value.
    async fn restart(&self, concurrency: u32) -> Result<()>;

    /// Terminate the workload: graceful first, forced after the stop timeout.
    /// Stopping an already-stopped actuator is a no-op.
    async fn stop(&self) -> Result<()>;

    /// Total output bytes observed since the last (re)start
    fn output_bytes(&self) -> u64;

    /// Whether a live child exists
    async fn is_running(&self) -> bool;

    /// PID of the live child, if any
    async fn pid(&self) -> Option<u32>;
}
