//! # guard-engine
//!
//! The periodic control loop of gpu-stress-guardian.
//!
//! Each tick the engine samples telemetry, feeds the throughput tracker from
//! the actuator's output-byte counter, refreshes the state estimate, asks the
//! policy for an action, applies cooldown and bounded-step rules, and drives
//! the workload actuator. Lifecycle state is reported as snapshots under a
//! mutex; a single cancellation token threads shutdown through the loop.

pub mod config;
pub mod engine;
pub mod state;

pub use config::EngineConfig;
pub use engine::{Engine, TelemetrySource};
pub use state::{EngineResult, Lifecycle, LifecyclePhase, RunState};

/// Engine API version tag carried in start events and results
pub const API_VERSION: &str = "v1";

/// Telemetry window capacity; oldest samples are evicted first
pub const MAX_TELEMETRY_SAMPLES: usize = 300;
