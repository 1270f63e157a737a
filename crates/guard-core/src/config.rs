//! Configuration management for gpu-stress-guardian
//!
//! Provides a unified configuration system that supports YAML files,
//! environment variables, and programmatic overrides. Zero or absent values
//! are normalized to the documented defaults before validation, so partially
//! specified configurations behave predictably.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for the guardian
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianConfig {
    /// Workload process configuration
    pub workload: WorkloadConfig,

    /// Control engine configuration
    pub engine: EngineSettings,

    /// Thermal/memory/throttle thresholds consumed by the policy
    pub thresholds: ThresholdConfig,

    /// Throughput tracking and recovery configuration
    pub throughput: ThroughputConfig,

    /// Session supervision configuration
    pub session: SessionSettings,

    /// Event log configuration
    pub logging: LoggingConfig,
}

impl GuardianConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Configuration file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        // Start with defaults
        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        // Add configuration file if it exists
        if let Ok(config_path) = std::env::var("GUARDIAN_CONFIG") {
            builder = builder.add_source(config::File::with_name(&config_path).required(false));
        } else {
            // Try common config file locations
            for path in &["./guardian.yaml", "/etc/guardian/config.yaml"] {
                builder = builder.add_source(config::File::with_name(path).required(false));
            }
        }

        // Add environment variables with GUARDIAN_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("GUARDIAN")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut parsed: Self = config.try_deserialize()?;

        parsed.normalize();
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path));

        let config = builder.build()?;
        let mut parsed: Self = config.try_deserialize()?;
        parsed.normalize();
        parsed.validate()?;

        Ok(parsed)
    }

    /// Coerce zero/absent values to the documented defaults and restore the
    /// ordering invariants between related fields.
    pub fn normalize(&mut self) {
        self.workload.normalize();
        self.engine.normalize();
        self.thresholds.normalize();
        self.throughput.normalize();
        self.session.normalize();
        self.logging.normalize();
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.workload.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            workload: WorkloadConfig::default(),
            engine: EngineSettings::default(),
            thresholds: ThresholdConfig::default(),
            throughput: ThroughputConfig::default(),
            session: SessionSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Workload process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Shell command launching the workload
    pub command: String,

    /// Append-only file receiving the workload's combined output.
    /// A temporary file is created when unset.
    pub workload_log_path: Option<PathBuf>,

    /// Mirror workload output to the guardian's stdout
    pub echo_workload_output: bool,

    /// Grace period before the workload is force-killed on stop
    pub adapter_stop_timeout_sec: u64,
}

impl WorkloadConfig {
    fn normalize(&mut self) {
        if self.adapter_stop_timeout_sec == 0 {
            self.adapter_stop_timeout_sec = 5;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(crate::Error::config("workload command is required"));
        }
        Ok(())
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            workload_log_path: None,
            echo_workload_output: false,
            adapter_stop_timeout_sec: 5,
        }
    }
}

/// Control engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Seconds between control ticks
    pub poll_interval_sec: u64,

    /// Lower concurrency bound
    pub min_concurrency: u32,

    /// Upper concurrency bound
    pub max_concurrency: u32,

    /// Concurrency at startup, clamped into [min, max]
    pub start_concurrency: u32,

    /// Per-action limit on concurrency change
    pub max_concurrency_step: u32,

    /// Minimum seconds between applied directional actions
    pub adjustment_cooldown_sec: u64,

    /// Stop after this many ticks (0 = unbounded)
    pub max_ticks: u64,

    /// Baseline throughput seeded from a profile or checkpoint (0 = learn)
    pub initial_baseline_throughput: f64,

    /// Append-only JSONL file receiving one telemetry sample per tick
    pub telemetry_log_path: Option<PathBuf>,
}

impl EngineSettings {
    fn normalize(&mut self) {
        if self.poll_interval_sec == 0 {
            self.poll_interval_sec = 2;
        }
        if self.adjustment_cooldown_sec == 0 {
            self.adjustment_cooldown_sec = 10;
        }
        if self.min_concurrency == 0 {
            self.min_concurrency = 1;
        }
        if self.max_concurrency == 0 {
            self.max_concurrency = self.min_concurrency;
        }
        if self.min_concurrency > self.max_concurrency {
            self.min_concurrency = self.max_concurrency;
        }
        self.start_concurrency = self
            .start_concurrency
            .clamp(self.min_concurrency, self.max_concurrency);
        if self.max_concurrency_step == 0 {
            self.max_concurrency_step = 1;
        }
        if self.initial_baseline_throughput < 0.0 {
            self.initial_baseline_throughput = 0.0;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_concurrency > self.max_concurrency {
            return Err(crate::Error::config(format!(
                "min concurrency {} is greater than max concurrency {}",
                self.min_concurrency, self.max_concurrency
            )));
        }
        Ok(())
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_sec: 2,
            min_concurrency: 1,
            max_concurrency: 1,
            start_concurrency: 1,
            max_concurrency_step: 1,
            adjustment_cooldown_sec: 10,
            max_ticks: 0,
            initial_baseline_throughput: 0.0,
            telemetry_log_path: None,
        }
    }
}

/// Thermal/memory/throttle thresholds consumed by the policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Warning temperature; a rising temperature at/above it decreases load
    pub soft_temp: f64,

    /// Absolute temperature; reaching it pauses the workload
    pub hard_temp: f64,

    /// Margin under soft_temp required before scaling up
    pub temp_hysteresis_c: f64,

    /// VRAM used/total ratio above which load is decreased
    pub memory_pressure_limit: f64,

    /// Smoothed throttle-risk score above which load is decreased
    pub throttle_risk_limit: f64,

    /// Minimum estimator confidence for directional action
    pub estimate_confidence_min: f64,

    /// Maximum tolerated temperature slope in C/s
    pub max_temp_slope_c_per_sec: f64,

    /// Minimum stability index required before scaling up
    pub min_stability_index_for_increase: f64,

    /// Negative relative throughput change that triggers a decrease
    pub throughput_trend_drop_limit: f64,
}

impl ThresholdConfig {
    fn normalize(&mut self) {
        if self.soft_temp <= 0.0 {
            self.soft_temp = 78.0;
        }
        if self.hard_temp <= 0.0 {
            self.hard_temp = 84.0;
        }
        if self.temp_hysteresis_c <= 0.0 {
            self.temp_hysteresis_c = 2.0;
        }
        if self.memory_pressure_limit <= 0.0 {
            self.memory_pressure_limit = 0.9;
        }
        if self.throttle_risk_limit <= 0.0 {
            self.throttle_risk_limit = 0.85;
        }
        if self.estimate_confidence_min <= 0.0 {
            self.estimate_confidence_min = 0.4;
        }
        if self.max_temp_slope_c_per_sec <= 0.0 {
            self.max_temp_slope_c_per_sec = 2.0;
        }
        if self.min_stability_index_for_increase <= 0.0 {
            self.min_stability_index_for_increase = 0.55;
        }
        if self.throughput_trend_drop_limit >= 0.0 {
            self.throughput_trend_drop_limit = -0.18;
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            soft_temp: 78.0,
            hard_temp: 84.0,
            temp_hysteresis_c: 2.0,
            memory_pressure_limit: 0.9,
            throttle_risk_limit: 0.85,
            estimate_confidence_min: 0.4,
            max_temp_slope_c_per_sec: 2.0,
            min_stability_index_for_increase: 0.55,
            throughput_trend_drop_limit: -0.18,
        }
    }
}

/// Throughput tracking and recovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputConfig {
    /// Fraction of baseline below which throughput is considered degraded
    pub floor_ratio: f64,

    /// Fraction of baseline below which recovery turns aggressive.
    /// Clamped to at most `floor_ratio`.
    pub slowdown_floor_ratio: f64,

    /// Extra margin over the floor required before scaling up
    pub recovery_margin: f64,

    /// Sustained below-floor ticks tolerated before pausing
    pub recovery_max_attempts: u32,

    /// Step multiplier applied on aggressive recovery
    pub recovery_step_multiplier: u32,

    /// Sliding window retaining throughput samples, seconds
    pub window_sec: u64,

    /// Window over which every sample must violate a floor, seconds
    pub floor_window_sec: u64,

    /// Warmup period before the baseline freezes, seconds
    pub baseline_window_sec: u64,
}

impl ThroughputConfig {
    fn normalize(&mut self) {
        if self.floor_ratio <= 0.0 {
            self.floor_ratio = 0.7;
        }
        if self.slowdown_floor_ratio <= 0.0 || self.slowdown_floor_ratio > self.floor_ratio {
            self.slowdown_floor_ratio = 0.5;
        }
        if self.recovery_margin <= 0.0 {
            self.recovery_margin = 0.05;
        }
        if self.recovery_max_attempts == 0 {
            self.recovery_max_attempts = 3;
        }
        if self.recovery_step_multiplier <= 1 {
            self.recovery_step_multiplier = 2;
        }
        if self.window_sec == 0 {
            self.window_sec = 30;
        }
        if self.floor_window_sec == 0 {
            self.floor_window_sec = 30;
        }
        if self.baseline_window_sec == 0 {
            self.baseline_window_sec = 120;
        }
    }
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            floor_ratio: 0.7,
            slowdown_floor_ratio: 0.5,
            recovery_margin: 0.05,
            recovery_max_attempts: 3,
            recovery_step_multiplier: 2,
            window_sec: 30,
            floor_window_sec: 30,
            baseline_window_sec: 120,
        }
    }
}

/// Session execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// No persistence; a terminated run is final
    #[default]
    Stateless,
    /// Checkpointed with bounded automatic recovery
    Stateful,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Stateless => write!(f, "stateless"),
            SessionMode::Stateful => write!(f, "stateful"),
        }
    }
}

/// Session supervision configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Stateless or stateful supervision
    pub mode: SessionMode,

    /// Checkpoint file for stateful sessions; a path under the system temp
    /// directory is generated when unset
    pub checkpoint_path: Option<PathBuf>,

    /// Recoverable engine failures tolerated before the session pauses
    pub recovery_max_retries: u32,

    /// Seconds between recovery attempts
    pub recovery_cooldown_sec: u64,
}

impl SessionSettings {
    fn normalize(&mut self) {
        if self.recovery_max_retries == 0 {
            self.recovery_max_retries = 1;
        }
        if self.recovery_cooldown_sec == 0 {
            self.recovery_cooldown_sec = 1;
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: SessionMode::Stateless,
            checkpoint_path: None,
            recovery_max_retries: 1,
            recovery_cooldown_sec: 1,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append-only JSONL event log; stdout-only when unset
    pub log_file: Option<PathBuf>,

    /// Rotate the event log when the next line would exceed this size
    pub log_max_size_bytes: u64,

    /// Mirror event log lines to stdout
    pub echo_to_stdout: bool,
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.log_max_size_bytes == 0 {
            self.log_max_size_bytes = 50 * 1024 * 1024;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            log_max_size_bytes: 50 * 1024 * 1024,
            echo_to_stdout: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_normalizes_cleanly() {
        let mut config = GuardianConfig::default();
        config.normalize();
        assert_eq!(config.engine.poll_interval_sec, 2);
        assert_eq!(config.thresholds.soft_temp, 78.0);
        assert_eq!(config.thresholds.hard_temp, 84.0);
        assert_eq!(config.throughput.floor_ratio, 0.7);
        assert_eq!(config.session.recovery_max_retries, 1);
    }

    #[test]
    fn test_command_required() {
        let mut config = GuardianConfig::default();
        config.normalize();
        assert!(config.validate().is_err());

        config.workload.command = "python batch.py".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_concurrency_normalization() {
        let mut engine = EngineSettings {
            min_concurrency: 4,
            max_concurrency: 2,
            start_concurrency: 9,
            ..EngineSettings::default()
        };
        engine.normalize();

        // Inverted bounds collapse to max; start is clamped into range.
        assert_eq!(engine.min_concurrency, 2);
        assert_eq!(engine.max_concurrency, 2);
        assert_eq!(engine.start_concurrency, 2);
    }

    #[test]
    fn test_slowdown_ratio_clamped_to_floor() {
        let mut throughput = ThroughputConfig {
            floor_ratio: 0.6,
            slowdown_floor_ratio: 0.8,
            ..ThroughputConfig::default()
        };
        throughput.normalize();
        assert_eq!(throughput.slowdown_floor_ratio, 0.5);

        let mut throughput = ThroughputConfig {
            floor_ratio: 0.6,
            slowdown_floor_ratio: 0.6,
            ..ThroughputConfig::default()
        };
        throughput.normalize();
        assert_eq!(throughput.slowdown_floor_ratio, 0.6);
    }

    #[test]
    fn test_trend_drop_limit_must_be_negative() {
        let mut thresholds = ThresholdConfig {
            throughput_trend_drop_limit: 0.3,
            ..ThresholdConfig::default()
        };
        thresholds.normalize();
        assert_eq!(thresholds.throughput_trend_drop_limit, -0.18);
    }

    #[test]
    fn test_recovery_step_multiplier_floor() {
        let mut throughput = ThroughputConfig {
            recovery_step_multiplier: 1,
            ..ThroughputConfig::default()
        };
        throughput.normalize();
        assert_eq!(throughput.recovery_step_multiplier, 2);
    }

    #[test]
    fn test_config_serialization() {
        let config = GuardianConfig::default();

        // Test YAML serialization
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: GuardianConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, deserialized);

        // Test JSON serialization
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: GuardianConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.engine.max_concurrency, deserialized.engine.max_concurrency);
    }

    #[test]
    fn test_session_mode_roundtrip() {
        assert_eq!(
            serde_json::to_string(&SessionMode::Stateful).unwrap(),
            "\"stateful\""
        );
        let mode: SessionMode = serde_json::from_str("\"stateless\"").unwrap();
        assert_eq!(mode, SessionMode::Stateless);
    }
}
