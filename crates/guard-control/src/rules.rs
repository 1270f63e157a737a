//! Prioritised rule cascade producing typed control actions
//!
//! Rule order, first match wins:
//! VRAM ceiling, hard temperature, rising soft temperature, memory pressure,
//! temperature slope, throttle risk, throughput trend, throughput floor /
//! slowdown fallback, missing-temperature guard, low-confidence guard,
//! scale-up, hold.

use crate::action::{Action, ControlState};
use crate::estimator::StateEstimate;
use chrono::{DateTime, Duration, Utc};
use guard_core::config::GuardianConfig;
use guard_telemetry::TelemetrySample;
use guard_throughput::Sample as ThroughputSample;

/// Policy seam between the engine and its decision logic
pub trait Controller: Send {
    /// Evaluate the rule cascade against the latest windows and state
    fn decide(
        &mut self,
        telemetry: &[TelemetrySample],
        throughput: &[ThroughputSample],
        state: &ControlState,
    ) -> Action;
}

/// Thresholds and windows consumed by [`RuleController`]
#[derive(Debug, Clone)]
pub struct RuleConfig {
    pub soft_temp: f64,
    pub hard_temp: f64,
    pub temp_hysteresis_c: f64,
    pub memory_pressure_limit: f64,
    pub throttle_risk_limit: f64,
    pub estimate_confidence_min: f64,
    pub max_temp_slope_c_per_sec: f64,
    pub min_stability_index_for_increase: f64,
    pub throughput_trend_drop_limit: f64,
    pub throughput_floor_ratio: f64,
    pub throughput_slowdown_floor_ratio: f64,
    pub throughput_recovery_margin: f64,
    pub throughput_recovery_max_attempts: u32,
    pub throughput_recovery_step_multiplier: u32,
    pub throughput_window: Duration,
    pub throughput_floor_window: Duration,
    pub max_concurrency_step: u32,
}

impl Default for RuleConfig {
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
            throughput_floor_ratio: 0.7,
            throughput_slowdown_floor_ratio: 0.5,
            throughput_recovery_margin: 0.05,
            throughput_recovery_max_attempts: 3,
            throughput_recovery_step_multiplier: 2,
            throughput_window: Duration::seconds(30),
            throughput_floor_window: Duration::seconds(30),
            max_concurrency_step: 1,
        }
    }
}

impl RuleConfig {
    /// Derive the rule configuration from a normalized guardian config
    pub fn from_guardian(config: &GuardianConfig) -> Self {
        Self {
            soft_temp: config.thresholds.soft_temp,
            hard_temp: config.thresholds.hard_temp,
            temp_hysteresis_c: config.thresholds.temp_hysteresis_c,
            memory_pressure_limit: config.thresholds.memory_pressure_limit,
            throttle_risk_limit: config.thresholds.throttle_risk_limit,
            estimate_confidence_min: config.thresholds.estimate_confidence_min,
            max_temp_slope_c_per_sec: config.thresholds.max_temp_slope_c_per_sec,
            min_stability_index_for_increase: config.thresholds.min_stability_index_for_increase,
            throughput_trend_drop_limit: config.thresholds.throughput_trend_drop_limit,
            throughput_floor_ratio: config.throughput.floor_ratio,
            throughput_slowdown_floor_ratio: config.throughput.slowdown_floor_ratio,
            throughput_recovery_margin: config.throughput.recovery_margin,
            throughput_recovery_max_attempts: config.throughput.recovery_max_attempts,
            throughput_recovery_step_multiplier: config.throughput.recovery_step_multiplier,
            throughput_window: Duration::seconds(config.throughput.window_sec as i64),
            throughput_floor_window: Duration::seconds(config.throughput.floor_window_sec as i64),
            max_concurrency_step: config.engine.max_concurrency_step,
        }
    }

    /// Coerce out-of-range values to the documented defaults
    fn normalize(&mut self) {
        if self.soft_temp <= 0.0 {
            self.soft_temp = 78.0;
        }
        if self.hard_temp <= 0.0 {
            self.hard_temp = 84.0;
        }
        if self.temp_hysteresis_c < 0.0 {
            self.temp_hysteresis_c = 0.0;
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
        if self.throughput_floor_ratio <= 0.0 {
            self.throughput_floor_ratio = 0.7;
        }
        if self.throughput_slowdown_floor_ratio <= 0.0
            || self.throughput_slowdown_floor_ratio > self.throughput_floor_ratio
        {
            self.throughput_slowdown_floor_ratio = 0.5;
        }
        if self.throughput_recovery_margin <= 0.0 {
            self.throughput_recovery_margin = 0.05;
        }
        if self.throughput_recovery_max_attempts == 0 {
            self.throughput_recovery_max_attempts = 3;
        }
        if self.throughput_recovery_step_multiplier <= 1 {
            self.throughput_recovery_step_multiplier = 2;
        }
        if self.max_concurrency_step == 0 {
            self.max_concurrency_step = 1;
        }
    }
}

/// Rule-cascade controller.
///
/// Pure over its inputs apart from the throughput-recovery attempts counter,
/// which persists across ticks until the floor condition clears.
pub struct RuleController {
    config: RuleConfig,
    recovery_attempts: u32,
}

impl RuleController {
    pub fn new(mut config: RuleConfig) -> Self {
        config.normalize();
        Self {
            config,
            recovery_attempts: 0,
        }
    }

    /// Sustained below-floor ticks recorded so far
    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    fn should_increase(
        &self,
        state: &ControlState,
        avg_rate: f64,
        temp: i64,
        memory_pressure: f64,
        throttle_risk: f64,
        estimate: &StateEstimate,
    ) -> bool {
        let c = &self.config;
        if state.current_concurrency >= state.max_concurrency {
            return false;
        }
        if estimate.stability_index_valid
            && estimate.stability_index < c.min_stability_index_for_increase
        {
            return false;
        }
        if estimate.confidence_valid && estimate.confidence < c.estimate_confidence_min {
            return false;
        }
        if temp as f64 > c.soft_temp - c.temp_hysteresis_c {
            return false;
        }
        if memory_pressure >= c.memory_pressure_limit - 0.03 {
            return false;
        }
        if throttle_risk >= c.throttle_risk_limit * 0.8 {
            return false;
        }
        if state.baseline_throughput <= 0.0 {
            return true;
        }
        avg_rate / state.baseline_throughput
            >= c.throughput_floor_ratio + c.throughput_recovery_margin
    }
}

impl Controller for RuleController {
    fn decide(
        &mut self,
        telemetry: &[TelemetrySample],
        throughput: &[ThroughputSample],
        state: &ControlState,
    ) -> Action {
        let c = self.config.clone();
        let now = state.now;
        let avg_rate = windowed_average(throughput, c.throughput_window, now);

        let latest_temp = latest_valid(telemetry, |s| s.temp_valid, |s| s.temp_c);
        let prev_temp = previous_valid(telemetry, |s| s.temp_valid, |s| s.temp_c);
        let memory_pressure =
            latest_valid(telemetry, |s| s.memory_pressure_valid, |s| s.memory_pressure);
        let raw_throttle_risk =
            latest_valid(telemetry, |s| s.throttle_risk_valid, |s| s.throttle_risk);

        // The smoothed risk score supersedes the raw latest-sample ratio when
        // the estimator produced one this tick.
        let throttle_risk = if state.estimate.throttle_risk_score_valid {
            Some(state.estimate.throttle_risk_score)
        } else {
            raw_throttle_risk
        };

        if let Some(pressure) = memory_pressure {
            if pressure >= 1.0 {
                return Action::pause(
                    "vram ceiling exceeded",
                    vec![format_signal("memory_pressure", pressure, 1.0)],
                );
            }
        }

        if let Some(temp) = latest_temp {
            if temp as f64 >= c.hard_temp {
                return Action::pause(
                    "hard temperature limit exceeded",
                    vec![format_signal("hard_temp_limit", temp as f64, c.hard_temp)],
                );
            }

            if let Some(prev) = prev_temp {
                if temp as f64 >= c.soft_temp && temp > prev {
                    return Action::decrease(
                        state.current_concurrency,
                        c.max_concurrency_step,
                        "temperature rising at/above soft limit",
                        vec![format_signal("temp_rise", temp as f64, c.soft_temp)],
                    )
                    .with_cooldown(1.0);
                }
            }
        }

        if let Some(pressure) = memory_pressure {
            if pressure >= c.memory_pressure_limit {
                return Action::decrease(
                    state.current_concurrency,
                    c.max_concurrency_step,
                    "memory pressure near saturation",
                    vec![format_signal(
                        "memory_pressure",
                        pressure,
                        c.memory_pressure_limit,
                    )],
                )
                .with_cooldown(1.5);
            }
        }

        if state.estimate.temp_slope_valid
            && state.estimate.temp_slope_c_per_sec >= c.max_temp_slope_c_per_sec
        {
            return Action::decrease(
                state.current_concurrency,
                c.max_concurrency_step,
                "temperature rising too fast",
                vec![format_signal(
                    "temp_slope_c_per_sec",
                    state.estimate.temp_slope_c_per_sec,
                    c.max_temp_slope_c_per_sec,
                )],
            )
            .with_cooldown(1.5);
        }

        if let Some(risk) = throttle_risk {
            if risk >= c.throttle_risk_limit {
                return Action::decrease(
                    state.current_concurrency,
                    c.max_concurrency_step,
                    "throttle risk elevated",
                    vec![format_signal("throttle_risk", risk, c.throttle_risk_limit)],
                )
                .with_cooldown(1.5);
            }
        }

        if state.estimate.throughput_trend_valid
            && state.estimate.throughput_trend < c.throughput_trend_drop_limit
        {
            return Action::decrease(
                state.current_concurrency,
                c.max_concurrency_step,
                "throughput trend dropped",
                vec![format_signal(
                    "throughput_trend",
                    state.estimate.throughput_trend,
                    c.throughput_trend_drop_limit,
                )],
            )
            .with_cooldown(1.25);
        }

        if state.baseline_throughput > 0.0 {
            let threshold = state.baseline_throughput * c.throughput_floor_ratio;
            let slowdown_threshold =
                state.baseline_throughput * c.throughput_slowdown_floor_ratio;

            let below_floor =
                all_below_threshold(throughput, now, threshold, c.throughput_floor_window);
            let below_slowdown = all_below_threshold(
                throughput,
                now,
                slowdown_threshold,
                c.throughput_floor_window,
            );

            if (below_floor || below_slowdown) && avg_rate > 0.0 {
                self.recovery_attempts += 1;
                if self.recovery_attempts > c.throughput_recovery_max_attempts {
                    self.recovery_attempts = c.throughput_recovery_max_attempts;
                    return Action::pause(
                        "throughput recovery attempts exceeded, pausing to preserve state",
                        vec!["throughput_floor_recovery".to_string()],
                    );
                }

                if below_slowdown {
                    let step = c.max_concurrency_step * c.throughput_recovery_step_multiplier;
                    return Action::decrease(
                        state.current_concurrency,
                        step,
                        "throughput below slowdown fallback, aggressive recovery",
                        vec!["throughput_below_slowdown_fallback".to_string()],
                    );
                }
                return Action::decrease(
                    state.current_concurrency,
                    c.max_concurrency_step,
                    "throughput below floor sustained",
                    vec!["throughput_below_floor".to_string()],
                );
            }

            self.recovery_attempts = 0;
        }

        let temp = match latest_temp {
            Some(temp) => temp,
            None => {
                return Action::hold(
                    state.current_concurrency,
                    "telemetry missing temp, no safe directional action",
                )
            }
        };

        if state.estimate.confidence_valid && state.estimate.confidence < c.estimate_confidence_min
        {
            return Action::hold(
                state.current_concurrency,
                "estimate confidence below configured threshold",
            );
        }

        if self.should_increase(
            state,
            avg_rate,
            temp,
            memory_pressure.unwrap_or(0.0),
            throttle_risk.unwrap_or(0.0),
            &state.estimate,
        ) {
            return Action::increase(
                state.current_concurrency,
                1,
                "temperature and throughput stable",
                vec!["all_guardrails_clear".to_string()],
            );
        }

        Action::hold(state.current_concurrency, "no-op")
    }
}

fn format_signal(metric: &str, value: f64, threshold: f64) -> String {
    format!("{metric} {value:.2} >= {threshold:.2}")
}

fn latest_valid<T: Copy>(
    samples: &[TelemetrySample],
    valid: impl Fn(&TelemetrySample) -> bool,
    value: impl Fn(&TelemetrySample) -> T,
) -> Option<T> {
    samples.iter().rev().find(|s| valid(s)).map(|s| value(s))
}

fn previous_valid<T: Copy>(
    samples: &[TelemetrySample],
    valid: impl Fn(&TelemetrySample) -> bool,
    value: impl Fn(&TelemetrySample) -> T,
) -> Option<T> {
    samples
        .iter()
        .rev()
        .filter(|s| valid(s))
        .nth(1)
        .map(|s| value(s))
}

fn windowed_average(samples: &[ThroughputSample], window: Duration, now: DateTime<Utc>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let cutoff = now - window;
    let mut sum = 0.0;
    let mut count = 0usize;
    for s in samples {
        if s.timestamp < cutoff {
            continue;
        }
        sum += s.rate;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Whether every sample inside the window sits below `threshold`.
///
/// Vacuously true with no samples in the window; callers additionally gate on
/// a positive running average.
fn all_below_threshold(
    samples: &[ThroughputSample],
    now: DateTime<Utc>,
    threshold: f64,
    window: Duration,
) -> bool {
    if threshold <= 0.0 {
        return false;
    }
    let cutoff = now - window;
    for s in samples {
        if s.timestamp < cutoff {
            continue;
        }
        if s.rate >= threshold {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use chrono::TimeZone;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn temp_sample(seconds: i64, temp_c: i64) -> TelemetrySample {
        let mut s = TelemetrySample::new(t(seconds));
        s.temp_c = temp_c;
        s.temp_valid = true;
        s
    }

    fn rate_sample(seconds: i64, rate: f64) -> ThroughputSample {
        ThroughputSample {
            timestamp: t(seconds),
            rate,
        }
    }

    fn healthy_estimate() -> StateEstimate {
        StateEstimate {
            stability_index: 1.0,
            stability_index_valid: true,
            confidence: 1.0,
            confidence_valid: true,
            ..StateEstimate::default()
        }
    }

    fn state_at(current: u32, min: u32, max: u32, seconds: i64) -> ControlState {
        let mut state = ControlState::new(current, min, max, t(seconds));
        state.estimate = healthy_estimate();
        state
    }

    #[test]
    fn test_hard_temperature_triggers_pause() {
        let mut controller = RuleController::new(RuleConfig::default());
        let telemetry = vec![temp_sample(0, 84)];
        let state = state_at(4, 1, 8, 0);

        let action = controller.decide(&telemetry, &[], &state);
        assert_eq!(action.kind, ActionType::Pause);
        assert_eq!(action.reason, "hard temperature limit exceeded");
        assert!(action.signals[0].starts_with("hard_temp_limit 84.00"));
    }

    #[test]
    fn test_vram_ceiling_precedes_hard_temp() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut sample = temp_sample(0, 90);
        sample.vram_used_mb = 16384;
        sample.vram_used_valid = true;
        sample.vram_total_mb = 16384;
        sample.vram_total_valid = true;
        sample.derive_metrics();
        let state = state_at(4, 1, 8, 0);

        let action = controller.decide(&[sample], &[], &state);
        assert_eq!(action.kind, ActionType::Pause);
        assert_eq!(action.reason, "vram ceiling exceeded");
    }

    #[test]
    fn test_rising_soft_temp_decreases_with_cooldown_override() {
        let mut controller = RuleController::new(RuleConfig::default());
        let telemetry = vec![temp_sample(0, 78), temp_sample(2, 80)];
        let state = state_at(4, 1, 8, 2);

        let action = controller.decide(&telemetry, &[], &state);
        assert_eq!(action.kind, ActionType::Decrease);
        assert_eq!(action.concurrency, 3);
        assert_eq!(action.reason, "temperature rising at/above soft limit");
        assert_eq!(action.cooldown_sec, 1.0);
    }

    #[test]
    fn test_flat_soft_temp_does_not_decrease() {
        let mut controller = RuleController::new(RuleConfig::default());
        // At the soft limit but not strictly rising.
        let telemetry = vec![temp_sample(0, 80), temp_sample(2, 80)];
        let state = state_at(4, 1, 8, 2);

        let action = controller.decide(&telemetry, &[], &state);
        assert_ne!(action.kind, ActionType::Decrease);
    }

    #[test]
    fn test_memory_pressure_decrease() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut sample = temp_sample(0, 60);
        sample.vram_used_mb = 15000;
        sample.vram_used_valid = true;
        sample.vram_total_mb = 16000;
        sample.vram_total_valid = true;
        sample.derive_metrics();
        let state = state_at(4, 1, 8, 0);

        let action = controller.decide(&[sample], &[], &state);
        assert_eq!(action.kind, ActionType::Decrease);
        assert_eq!(action.reason, "memory pressure near saturation");
        assert_eq!(action.cooldown_sec, 1.5);
    }

    #[test]
    fn test_temp_slope_decrease() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut state = state_at(4, 1, 8, 0);
        state.estimate.temp_slope_c_per_sec = 2.5;
        state.estimate.temp_slope_valid = true;

        let action = controller.decide(&[temp_sample(0, 60)], &[], &state);
        assert_eq!(action.kind, ActionType::Decrease);
        assert_eq!(action.reason, "temperature rising too fast");
    }

    #[test]
    fn test_smoothed_throttle_risk_supersedes_raw() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut sample = temp_sample(0, 60);
        sample.throttle_risk = 0.2;
        sample.throttle_risk_valid = true;
        let mut state = state_at(4, 1, 8, 0);
        state.estimate.throttle_risk_score = 0.9;
        state.estimate.throttle_risk_score_valid = true;

        let action = controller.decide(&[sample], &[], &state);
        assert_eq!(action.kind, ActionType::Decrease);
        assert_eq!(action.reason, "throttle risk elevated");
    }

    #[test]
    fn test_throughput_trend_decrease() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut state = state_at(4, 1, 8, 0);
        state.estimate.throughput_trend = -0.3;
        state.estimate.throughput_trend_valid = true;

        let action = controller.decide(&[temp_sample(0, 60)], &[], &state);
        assert_eq!(action.kind, ActionType::Decrease);
        assert_eq!(action.reason, "throughput trend dropped");
        assert_eq!(action.cooldown_sec, 1.25);
    }

    #[test]
    fn test_aggressive_recovery_on_slowdown_fallback() {
        // Baseline 10, slowdown ratio 0.5, rate 4 sustained across the window.
        let config = RuleConfig {
            throughput_floor_ratio: 0.7,
            throughput_slowdown_floor_ratio: 0.5,
            throughput_floor_window: Duration::seconds(1),
            max_concurrency_step: 2,
            throughput_recovery_step_multiplier: 3,
            ..RuleConfig::default()
        };
        let mut controller = RuleController::new(config);
        let mut state = state_at(8, 1, 10, 2);
        state.baseline_throughput = 10.0;
        let throughput = vec![rate_sample(0, 4.0), rate_sample(1, 4.0), rate_sample(2, 4.0)];

        let action = controller.decide(&[temp_sample(2, 60)], &throughput, &state);
        assert_eq!(action.kind, ActionType::Decrease);
        assert_eq!(action.concurrency, 2); // 8 - 2*3
        assert!(action.reason.contains("aggressive recovery"));
    }

    #[test]
    fn test_recovery_exhaustion_pauses() {
        // Attempts 1 and 2 decrease, attempt 3 pauses.
        let config = RuleConfig {
            throughput_recovery_max_attempts: 2,
            throughput_floor_window: Duration::seconds(5),
            ..RuleConfig::default()
        };
        let mut controller = RuleController::new(config);
        let mut state = state_at(6, 1, 10, 4);
        state.baseline_throughput = 100.0;
        let throughput = vec![rate_sample(2, 10.0), rate_sample(4, 10.0)];
        let telemetry = vec![temp_sample(4, 60)];

        let first = controller.decide(&telemetry, &throughput, &state);
        assert_eq!(first.kind, ActionType::Decrease);
        let second = controller.decide(&telemetry, &throughput, &state);
        assert_eq!(second.kind, ActionType::Decrease);
        let third = controller.decide(&telemetry, &throughput, &state);
        assert_eq!(third.kind, ActionType::Pause);
        assert!(third.reason.contains("throughput recovery attempts exceeded"));
    }

    #[test]
    fn test_recovery_counter_resets_when_floor_clears() {
        let config = RuleConfig {
            throughput_recovery_max_attempts: 2,
            throughput_floor_window: Duration::seconds(5),
            ..RuleConfig::default()
        };
        let mut controller = RuleController::new(config);
        let mut state = state_at(6, 1, 10, 4);
        state.baseline_throughput = 100.0;
        let telemetry = vec![temp_sample(4, 60)];

        let degraded = vec![rate_sample(2, 10.0), rate_sample(4, 10.0)];
        controller.decide(&telemetry, &degraded, &state);
        assert_eq!(controller.recovery_attempts(), 1);

        let healthy = vec![rate_sample(2, 95.0), rate_sample(4, 95.0)];
        controller.decide(&telemetry, &healthy, &state);
        assert_eq!(controller.recovery_attempts(), 0);
    }

    #[test]
    fn test_missing_temperature_holds() {
        let mut controller = RuleController::new(RuleConfig::default());
        let state = state_at(4, 1, 8, 0);

        let action = controller.decide(&[], &[], &state);
        assert_eq!(action.kind, ActionType::Hold);
        assert_eq!(action.reason, "telemetry missing temp, no safe directional action");
    }

    #[test]
    fn test_low_confidence_holds() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut state = state_at(4, 1, 8, 0);
        state.estimate.confidence = 0.2;
        state.estimate.confidence_valid = true;

        let action = controller.decide(&[temp_sample(0, 60)], &[], &state);
        assert_eq!(action.kind, ActionType::Hold);
        assert_eq!(action.reason, "estimate confidence below configured threshold");
    }

    #[test]
    fn test_healthy_increase_with_gating() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut state = state_at(4, 1, 8, 2);
        state.baseline_throughput = 12.0;
        let mut sample = temp_sample(2, 61);
        sample.vram_used_mb = 8000;
        sample.vram_used_valid = true;
        sample.vram_total_mb = 16000;
        sample.vram_total_valid = true;
        sample.power_draw_w = 45.0;
        sample.power_draw_valid = true;
        sample.power_limit_w = 450.0;
        sample.power_limit_valid = true;
        sample.derive_metrics();
        let throughput = vec![rate_sample(0, 10.5), rate_sample(2, 10.5)];

        let action = controller.decide(&[sample], &throughput, &state);
        assert_eq!(action.kind, ActionType::Increase);
        assert_eq!(action.concurrency, 5);
        assert_eq!(action.reason, "temperature and throughput stable");
    }

    #[test]
    fn test_increase_blocked_at_max_concurrency() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut state = state_at(8, 1, 8, 2);
        state.baseline_throughput = 0.0;

        let action = controller.decide(&[temp_sample(2, 50)], &[], &state);
        assert_eq!(action.kind, ActionType::Hold);
        assert_eq!(action.reason, "no-op");
    }

    #[test]
    fn test_increase_blocked_by_temp_hysteresis() {
        let mut controller = RuleController::new(RuleConfig::default());
        let state = state_at(4, 1, 8, 2);

        // 77 > 78 - 2, inside the hysteresis band.
        let action = controller.decide(&[temp_sample(2, 77)], &[], &state);
        assert_eq!(action.kind, ActionType::Hold);
    }

    #[test]
    fn test_increase_blocked_below_baseline_margin() {
        let mut controller = RuleController::new(RuleConfig::default());
        let mut state = state_at(4, 1, 8, 2);
        state.baseline_throughput = 100.0;
        // avg/baseline = 0.72, below floor_ratio + margin = 0.75.
        let throughput = vec![rate_sample(0, 72.0), rate_sample(2, 72.0)];

        let action = controller.decide(&[temp_sample(2, 50)], &throughput, &state);
        assert_eq!(action.kind, ActionType::Hold);
    }

    #[test]
    fn test_increase_without_baseline_is_ungated() {
        let mut controller = RuleController::new(RuleConfig::default());
        let state = state_at(4, 1, 8, 2);

        let action = controller.decide(&[temp_sample(2, 50)], &[], &state);
        assert_eq!(action.kind, ActionType::Increase);
        assert_eq!(action.concurrency, 5);
    }
}
