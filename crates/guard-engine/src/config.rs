//! Canonical engine bootstrap parameters

use guard_core::config::GuardianConfig;
use guard_core::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Typed engine configuration.
///
/// Built programmatically or derived from a normalized [`GuardianConfig`].
/// [`EngineConfig::apply_defaults`] coerces zero values; [`EngineConfig::validate`]
/// surfaces the errors that must fail an engine start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_version: String,
    pub command: String,
    pub poll_interval: Duration,
    pub min_concurrency: u32,
    pub max_concurrency: u32,
    pub start_concurrency: u32,
    pub max_concurrency_step: u32,
    pub adjustment_cooldown: Duration,
    pub throughput_window: Duration,
    pub baseline_window: Duration,
    pub max_ticks: u64,
    pub telemetry_log_path: Option<PathBuf>,
    pub initial_baseline_throughput: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_version: crate::API_VERSION.to_string(),
            command: String::new(),
            poll_interval: Duration::from_secs(2),
            min_concurrency: 1,
            max_concurrency: 1,
            start_concurrency: 1,
            max_concurrency_step: 1,
            adjustment_cooldown: Duration::from_secs(10),
            throughput_window: Duration::from_secs(30),
            baseline_window: Duration::from_secs(120),
            max_ticks: 0,
            telemetry_log_path: None,
            initial_baseline_throughput: 0.0,
        }
    }
}

impl EngineConfig {
    /// Derive the engine configuration from a normalized guardian config
    pub fn from_guardian(config: &GuardianConfig) -> Self {
        Self {
            api_version: crate::API_VERSION.to_string(),
            command: config.workload.command.clone(),
            poll_interval: Duration::from_secs(config.engine.poll_interval_sec),
            min_concurrency: config.engine.min_concurrency,
            max_concurrency: config.engine.max_concurrency,
            start_concurrency: config.engine.start_concurrency,
            max_concurrency_step: config.engine.max_concurrency_step,
            adjustment_cooldown: Duration::from_secs(config.engine.adjustment_cooldown_sec),
            throughput_window: Duration::from_secs(config.throughput.window_sec),
            baseline_window: Duration::from_secs(config.throughput.baseline_window_sec),
            max_ticks: config.engine.max_ticks,
            telemetry_log_path: config.engine.telemetry_log_path.clone(),
            initial_baseline_throughput: config.engine.initial_baseline_throughput,
        }
    }

    /// Coerce zero values to the documented defaults and restore the
    /// concurrency ordering invariants.
    pub fn apply_defaults(&mut self) {
        if self.api_version.is_empty() {
            self.api_version = crate::API_VERSION.to_string();
        }
        if self.poll_interval.is_zero() {
            self.poll_interval = Duration::from_secs(2);
        }
        if self.adjustment_cooldown.is_zero() {
            self.adjustment_cooldown = Duration::from_secs(10);
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
        if self.throughput_window.is_zero() {
            self.throughput_window = Duration::from_secs(30);
        }
        if self.baseline_window.is_zero() {
            self.baseline_window = Duration::from_secs(120);
        }
        if self.initial_baseline_throughput < 0.0 {
            self.initial_baseline_throughput = 0.0;
        }
    }

    /// Errors that must fail an engine start
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(guard_core::Error::config("command is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_zero_values() {
        let mut cfg = EngineConfig {
            poll_interval: Duration::ZERO,
            adjustment_cooldown: Duration::ZERO,
            min_concurrency: 0,
            max_concurrency: 0,
            start_concurrency: 7,
            ..EngineConfig::default()
        };
        cfg.apply_defaults();

        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.adjustment_cooldown, Duration::from_secs(10));
        assert_eq!(cfg.min_concurrency, 1);
        assert_eq!(cfg.max_concurrency, 1);
        assert_eq!(cfg.start_concurrency, 1);
    }

    #[test]
    fn test_validate_requires_command() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_err());

        let cfg = EngineConfig {
            command: "python batch.py".to_string(),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_guardian_maps_windows() {
        let mut guardian = GuardianConfig::default();
        guardian.workload.command = "python batch.py".to_string();
        guardian.engine.max_concurrency = 6;
        guardian.throughput.window_sec = 45;
        guardian.normalize();

        let cfg = EngineConfig::from_guardian(&guardian);
        assert_eq!(cfg.command, "python batch.py");
        assert_eq!(cfg.max_concurrency, 6);
        assert_eq!(cfg.throughput_window, Duration::from_secs(45));
        assert_eq!(cfg.api_version, crate::API_VERSION);
    }
}
