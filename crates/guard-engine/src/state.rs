//! Engine lifecycle and run-state snapshots

use chrono::{DateTime, Utc};
use guard_control::{Action, StateEstimate};
use guard_telemetry::TelemetrySample;
use guard_throughput::Sample as ThroughputSample;
use serde::{Deserialize, Serialize};

/// Explicit high-level engine execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Stopped => "stopped",
            LifecyclePhase::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Timestamped lifecycle snapshot exported to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub phase: LifecyclePhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Lifecycle {
    pub fn new(phase: LifecyclePhase, updated_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            reason: String::new(),
            error: None,
            updated_at,
        }
    }
}

/// Latest engine decision context and runtime snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunState {
    /// Completed control ticks
    pub ticks: u64,

    /// Currently applied concurrency
    pub current_concurrency: u32,

    /// Most recent policy action after bounding/cooldown
    pub last_action: Action,

    /// When the last non-hold action was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,

    /// When the last telemetry sample was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_telemetry_at: Option<DateTime<Utc>>,

    /// Most recent telemetry sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_telemetry: Option<TelemetrySample>,

    /// Most recent throughput observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_throughput: Option<ThroughputSample>,

    /// Learned or restored baseline rate
    pub baseline_throughput: f64,

    /// Latest smoothed state estimate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<StateEstimate>,

    /// PID of the live workload child, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_pid: Option<u32>,
}

/// Summary of a completed engine run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResult {
    pub state: RunState,
    pub stopped_at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&LifecyclePhase::Running).unwrap(),
            "\"running\""
        );
        let phase: LifecyclePhase = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(phase, LifecyclePhase::Failed);
        assert_eq!(LifecyclePhase::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_run_state_roundtrip() {
        let state = RunState {
            ticks: 12,
            current_concurrency: 3,
            baseline_throughput: 512.0,
            ..RunState::default()
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
