//! Exponentially-smoothed derived signals over the telemetry and throughput
//! windows

use chrono::{DateTime, Utc};
use guard_core::util::clamp01;
use guard_telemetry::TelemetrySample;
use guard_throughput::Sample as ThroughputSample;
use serde::{Deserialize, Serialize};

/// Derived signals recomputed each tick.
///
/// Each value carries a validity flag; an invalid raw input holds the
/// previous smoothed value and leaves the flag false for this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEstimate {
    pub timestamp: DateTime<Utc>,

    /// Temperature slope over the latest two valid samples, C per second
    pub temp_slope_c_per_sec: f64,
    pub temp_slope_valid: bool,

    /// Relative throughput change vs the previous sample
    pub throughput_trend: f64,
    pub throughput_trend_valid: bool,

    /// Power-draw ratio bumped by +0.2 when a throttle reason is active,
    /// clamped to [0, 1]
    pub throttle_risk_score: f64,
    pub throttle_risk_score_valid: bool,

    /// Composite calmness score in [0, 1]; high means stable
    pub stability_index: f64,
    pub stability_index_valid: bool,

    /// Fraction of the three underlying signals valid this tick
    pub confidence: f64,
    pub confidence_valid: bool,
}

impl Default for StateEstimate {
    fn default() -> Self {
        Self {
            timestamp: DateTime::<Utc>::MIN_UTC,
            temp_slope_c_per_sec: 0.0,
            temp_slope_valid: false,
            throughput_trend: 0.0,
            throughput_trend_valid: false,
            throttle_risk_score: 0.0,
            throttle_risk_score_valid: false,
            stability_index: 0.0,
            stability_index_valid: false,
            confidence: 0.0,
            confidence_valid: false,
        }
    }
}

/// Estimator tuning
#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    /// EMA factor; out-of-range values fall back to 0.35
    pub smoothing_factor: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.35,
        }
    }
}

/// EMA fusion of derived signals across ticks.
///
/// The first call bootstraps the smoothed values from the raw ones; later
/// calls fuse with `s' = alpha * raw + (1 - alpha) * s`.
pub struct StateEstimator {
    smoothing: f64,
    initialized: bool,

    smoothed_temp_slope: f64,
    smoothed_throughput_trend: f64,
    smoothed_throttle_risk: f64,
    smoothed_stability: f64,
    smoothed_confidence: f64,
}

impl Default for StateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl StateEstimator {
    pub fn new() -> Self {
        Self::with_config(EstimatorConfig::default())
    }

    pub fn with_config(config: EstimatorConfig) -> Self {
        let alpha = config.smoothing_factor;
        let alpha = if alpha <= 0.0 || alpha >= 1.0 { 0.35 } else { alpha };
        Self {
            smoothing: alpha,
            initialized: false,
            smoothed_temp_slope: 0.0,
            smoothed_throughput_trend: 0.0,
            smoothed_throttle_risk: 0.0,
            smoothed_stability: 0.0,
            smoothed_confidence: 0.0,
        }
    }

    /// Refresh the derived signals from the latest windows
    pub fn estimate(
        &mut self,
        telemetry: &[TelemetrySample],
        throughput: &[ThroughputSample],
    ) -> StateEstimate {
        let mut estimate = StateEstimate {
            timestamp: Utc::now(),
            ..StateEstimate::default()
        };

        let (raw_temp_slope, temp_slope_valid) = temp_slope(telemetry);
        let (raw_trend, trend_valid) = throughput_trend(throughput);
        let (raw_risk, risk_valid) = throttle_risk_score(telemetry);

        estimate.temp_slope_valid = temp_slope_valid;
        estimate.throughput_trend_valid = trend_valid;
        estimate.throttle_risk_score_valid = risk_valid;

        let (raw_stability, stability_valid) = stability_estimate(
            raw_temp_slope,
            temp_slope_valid,
            raw_trend,
            trend_valid,
            raw_risk,
            risk_valid,
        );

        let alpha = self.smoothing;
        let initialized = self.initialized;
        estimate.temp_slope_c_per_sec = fuse(
            alpha,
            initialized,
            &mut self.smoothed_temp_slope,
            raw_temp_slope,
            temp_slope_valid,
        );
        estimate.throughput_trend = fuse(
            alpha,
            initialized,
            &mut self.smoothed_throughput_trend,
            raw_trend,
            trend_valid,
        );
        estimate.throttle_risk_score = fuse(
            alpha,
            initialized,
            &mut self.smoothed_throttle_risk,
            raw_risk,
            risk_valid,
        );
        estimate.stability_index = fuse(
            alpha,
            initialized,
            &mut self.smoothed_stability,
            raw_stability,
            stability_valid,
        );
        estimate.stability_index_valid = stability_valid;

        let raw_confidence = confidence(temp_slope_valid, trend_valid, risk_valid);
        estimate.confidence = fuse(
            alpha,
            initialized,
            &mut self.smoothed_confidence,
            raw_confidence,
            true,
        );
        estimate.confidence_valid = true;

        self.initialized = true;
        estimate
    }
}

/// Fuse one raw reading into its smoothed counterpart.
///
/// Invalid readings pass the smoothed value through unchanged; the first
/// initialized reading bootstraps the smoothed value.
fn fuse(alpha: f64, initialized: bool, smoothed: &mut f64, raw: f64, valid: bool) -> f64 {
    if !valid {
        return *smoothed;
    }
    if !initialized {
        *smoothed = raw;
        return raw;
    }
    *smoothed = alpha * raw + (1.0 - alpha) * *smoothed;
    *smoothed
}

fn temp_slope(samples: &[TelemetrySample]) -> (f64, bool) {
    let mut iter = samples.iter().rev().filter(|s| s.temp_valid);
    let current = match iter.next() {
        Some(s) => s,
        None => return (0.0, false),
    };
    let previous = match iter.next() {
        Some(s) => s,
        None => return (0.0, false),
    };

    let delta = (current.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
    if delta <= 0.0 {
        return (0.0, false);
    }

    ((current.temp_c - previous.temp_c) as f64 / delta, true)
}

fn throughput_trend(samples: &[ThroughputSample]) -> (f64, bool) {
    if samples.len() < 2 {
        return (0.0, false);
    }
    let current = samples[samples.len() - 1];
    let previous = samples[samples.len() - 2];

    let delta_t = (current.timestamp - previous.timestamp).num_milliseconds() as f64 / 1000.0;
    if delta_t <= 0.0 {
        return (0.0, false);
    }
    if previous.rate == 0.0 {
        if current.rate == 0.0 {
            return (0.0, true);
        }
        return (1.0, true);
    }
    ((current.rate - previous.rate) / previous.rate, true)
}

fn throttle_risk_score(samples: &[TelemetrySample]) -> (f64, bool) {
    for s in samples.iter().rev() {
        if !s.throttle_risk_valid && !s.throttle_reasons_valid {
            continue;
        }
        let mut score = if s.throttle_risk_valid { s.throttle_risk } else { 0.0 };
        if s.throttle_reasons_valid && has_throttle_reason(&s.throttle_reasons) {
            score += 0.2;
        }
        return (clamp01(score), true);
    }
    (0.0, false)
}

/// Whether the reported throttle-reasons field names an active reason
fn has_throttle_reason(raw: &str) -> bool {
    !matches!(
        raw.trim().to_lowercase().as_str(),
        "" | "0" | "none" | "[none]" | "(none)"
    )
}

fn stability_estimate(
    temp_slope: f64,
    temp_slope_valid: bool,
    trend: f64,
    trend_valid: bool,
    risk: f64,
    risk_valid: bool,
) -> (f64, bool) {
    let valid_count = [temp_slope_valid, trend_valid, risk_valid]
        .iter()
        .filter(|v| **v)
        .count();
    if valid_count == 0 {
        return (0.0, false);
    }

    let temp_term = if temp_slope_valid {
        clamp01(temp_slope.abs() / 5.0)
    } else {
        0.0
    };
    let trend_term = if trend_valid {
        clamp01(trend.abs() / 0.5)
    } else {
        0.0
    };
    let risk_term = if risk_valid { clamp01(risk) } else { 0.0 };

    (
        (1.0 - (0.45 * temp_term + 0.35 * trend_term + 0.2 * risk_term)).clamp(0.0, 1.0),
        true,
    )
}

fn confidence(temp_slope_valid: bool, trend_valid: bool, risk_valid: bool) -> f64 {
    let valid_count = [temp_slope_valid, trend_valid, risk_valid]
        .iter()
        .filter(|v| **v)
        .count();
    (valid_count as f64 / 3.0).clamp(0.0, 1.0)
}
