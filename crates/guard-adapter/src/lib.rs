//! # guard-adapter
//!
//! Workload subprocess actuation for gpu-stress-guardian.
//!
//! This crate provides:
//! - The [`WorkloadActuator`] contract the control engine drives
//! - [`XttsAdapter`]: a subprocess actuator that launches the workload under
//!   `sh -lc`, sizes it through the `CONCURRENCY`/`XTTS_CONCURRENCY`
//!   environment variables, meters its combined output bytes, and terminates
//!   it gracefully before force-killing
//! - A scripted mock actuator for engine and supervisor tests

use thiserror::Error;

pub mod workload;
pub mod xtts;

// Mock implementation for testing
#[cfg(any(feature = "mock", test))]
pub mod mock;

pub use workload::WorkloadActuator;
pub use xtts::{AdapterConfig, XttsAdapter};

/// Result type for actuator operations
pub type Result<T> = std::result::Result<T, ActuatorError>;

/// Errors that can occur while actuating the workload
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("adapter already started")]
    AlreadyStarted,

    #[error("adapter already running")]
    AlreadyRunning,

    #[error("no command configured")]
    NoCommand,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to spawn workload: {0}")]
    Spawn(String),

    #[error("failed to signal workload: {0}")]
    Signal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActuatorError {
    /// Check if this error indicates a misuse of the actuator lifecycle
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            ActuatorError::AlreadyStarted | ActuatorError::AlreadyRunning | ActuatorError::NoCommand
        )
    }
}

impl From<ActuatorError> for guard_core::Error {
    fn from(err: ActuatorError) -> Self {
        guard_core::Error::Actuator(err.to_string())
    }
}
