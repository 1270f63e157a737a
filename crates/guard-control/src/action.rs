//! Typed control actions and the policy input snapshot

use crate::estimator::StateEstimate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four possible policy outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Keep the current concurrency
    #[default]
    Hold,
    /// Raise concurrency toward the target
    Increase,
    /// Lower concurrency toward the target
    Decrease,
    /// Stop the workload to preserve hardware or state
    Pause,
}

impl ActionType {
    /// Whether this action moves concurrency in a direction
    pub fn is_directional(&self) -> bool {
        matches!(self, ActionType::Increase | ActionType::Decrease)
    }

    /// Whether `other` is the opposite direction of `self`
    pub fn is_opposite(&self, other: ActionType) -> bool {
        matches!(
            (self, other),
            (ActionType::Increase, ActionType::Decrease)
                | (ActionType::Decrease, ActionType::Increase)
        )
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Hold => write!(f, "hold"),
            ActionType::Increase => write!(f, "increase"),
            ActionType::Decrease => write!(f, "decrease"),
            ActionType::Pause => write!(f, "pause"),
        }
    }
}

/// Immutable policy result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Action {
    /// What to do
    #[serde(rename = "type")]
    pub kind: ActionType,

    /// Target concurrency (pre-bounding); 0 for pause
    pub concurrency: u32,

    /// Human-readable explanation
    pub reason: String,

    /// Machine-readable trigger tags, e.g. `"temp_rise 84.00 >= 78.00"`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,

    /// Minimum cooldown the engine must honor for this action, seconds.
    /// 0 means no override.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cooldown_sec: f64,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl Action {
    /// Hold at the current concurrency
    pub fn hold(current: u32, reason: impl Into<String>) -> Self {
        Self {
            kind: ActionType::Hold,
            concurrency: current,
            reason: reason.into(),
            signals: Vec::new(),
            cooldown_sec: 0.0,
        }
    }

    /// Decrease by `step` (at least 1), saturating at zero before the engine
    /// clamps to the configured minimum.
    pub fn decrease(current: u32, step: u32, reason: impl Into<String>, signals: Vec<String>) -> Self {
        let step = step.max(1);
        Self {
            kind: ActionType::Decrease,
            concurrency: current.saturating_sub(step),
            reason: reason.into(),
            signals,
            cooldown_sec: 0.0,
        }
    }

    /// Increase by `step` (at least 1)
    pub fn increase(current: u32, step: u32, reason: impl Into<String>, signals: Vec<String>) -> Self {
        let step = step.max(1);
        Self {
            kind: ActionType::Increase,
            concurrency: current.saturating_add(step),
            reason: reason.into(),
            signals,
            cooldown_sec: 0.0,
        }
    }

    /// Pause the workload
    pub fn pause(reason: impl Into<String>, signals: Vec<String>) -> Self {
        Self {
            kind: ActionType::Pause,
            concurrency: 0,
            reason: reason.into(),
            signals,
            cooldown_sec: 0.0,
        }
    }

    /// Attach a cooldown override, seconds
    pub fn with_cooldown(mut self, seconds: f64) -> Self {
        self.cooldown_sec = seconds;
        self
    }
}

/// Immutable snapshot of engine state handed to the policy each tick
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    /// Applied concurrency at decision time
    pub current_concurrency: u32,

    /// Lower concurrency bound
    pub min_concurrency: u32,

    /// Upper concurrency bound
    pub max_concurrency: u32,

    /// Frozen baseline rate; 0 while still learning
    pub baseline_throughput: f64,

    /// When the last directional action was applied
    pub last_action_at: Option<DateTime<Utc>>,

    /// Latest smoothed state estimate
    pub estimate: StateEstimate,

    /// Decision time
    pub now: DateTime<Utc>,
}

impl ControlState {
    /// Snapshot with the given bounds and everything else empty
    pub fn new(current: u32, min: u32, max: u32, now: DateTime<Utc>) -> Self {
        Self {
            current_concurrency: current,
            min_concurrency: min,
            max_concurrency: max,
            baseline_throughput: 0.0,
            last_action_at: None,
            estimate: StateEstimate::default(),
            now,
        }
    }
}
