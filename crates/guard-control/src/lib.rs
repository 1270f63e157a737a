//! # guard-control
//!
//! Decision making for gpu-stress-guardian.
//!
//! This crate provides:
//! - [`StateEstimator`]: exponentially-smoothed derived signals (temperature
//!   slope, throughput trend, throttle risk, stability, confidence) over the
//!   latest telemetry and throughput windows
//! - [`RuleController`]: a prioritised rule cascade turning raw and smoothed
//!   signals into a typed [`Action`] with a human-readable reason and
//!   machine-readable signal tags
//!
//! The estimator is stateful (EMA across ticks) while the controller is pure
//! over its inputs apart from the throughput-recovery attempts counter; they
//! are distinct types so tests can feed the controller synthetic estimates
//! directly.

pub mod action;
pub mod estimator;
pub mod rules;

pub use action::{Action, ActionType, ControlState};
pub use estimator::{EstimatorConfig, StateEstimate, StateEstimator};
pub use rules::{Controller, RuleConfig, RuleController};
