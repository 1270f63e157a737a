//! One GPU telemetry snapshot with per-field validity

use chrono::{DateTime, Utc};
use guard_core::util::clamp01;
use serde::{Deserialize, Serialize};

/// One GPU snapshot produced each tick.
///
/// Every measured field carries a paired `_valid` flag; a parse failure
/// invalidates only that field and the derived ratios depending on it, so the
/// rest of the sample stays consumable by the policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Device UUID as reported by the platform tool (`GPU-` prefixed)
    pub gpu_uuid: String,
    pub gpu_uuid_valid: bool,

    /// Sample creation time
    pub timestamp: DateTime<Utc>,

    /// Core temperature in whole degrees Celsius
    pub temp_c: i64,
    pub temp_valid: bool,

    /// GPU utilization percent
    pub util_pct: f64,
    pub util_valid: bool,

    /// VRAM used in MiB
    pub vram_used_mb: i64,
    pub vram_used_valid: bool,

    /// VRAM total in MiB
    pub vram_total_mb: i64,
    pub vram_total_valid: bool,

    /// Power draw in Watts
    pub power_draw_w: f64,
    pub power_draw_valid: bool,

    /// Power limit in Watts
    pub power_limit_w: f64,
    pub power_limit_valid: bool,

    /// SM clock in MHz
    pub clock_sm_mhz: f64,
    pub clock_sm_valid: bool,

    /// Memory clock in MHz
    pub clock_mem_mhz: f64,
    pub clock_mem_valid: bool,

    /// used/total VRAM ratio, clamped to [0, 1]
    pub memory_pressure: f64,
    pub memory_pressure_valid: bool,

    /// draw/limit power ratio, clamped to [0, 1]
    pub throttle_risk: f64,
    pub throttle_risk_valid: bool,

    /// Active throttle reasons as reported (bitmask or text)
    pub throttle_reasons: String,
    pub throttle_reasons_valid: bool,

    /// Non-fatal degradation notes accumulated while sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TelemetrySample {
    /// Create an empty sample stamped `timestamp`, with every field invalid
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            gpu_uuid: String::new(),
            gpu_uuid_valid: false,
            timestamp,
            temp_c: 0,
            temp_valid: false,
            util_pct: 0.0,
            util_valid: false,
            vram_used_mb: 0,
            vram_used_valid: false,
            vram_total_mb: 0,
            vram_total_valid: false,
            power_draw_w: 0.0,
            power_draw_valid: false,
            power_limit_w: 0.0,
            power_limit_valid: false,
            clock_sm_mhz: 0.0,
            clock_sm_valid: false,
            clock_mem_mhz: 0.0,
            clock_mem_valid: false,
            memory_pressure: 0.0,
            memory_pressure_valid: false,
            throttle_risk: 0.0,
            throttle_risk_valid: false,
            throttle_reasons: String::new(),
            throttle_reasons_valid: false,
            error: None,
        }
    }

    /// Recompute the derived ratios from the measured fields.
    ///
    /// A ratio is valid only when both operands are valid and the denominator
    /// is positive.
    pub fn derive_metrics(&mut self) {
        if self.vram_used_valid && self.vram_total_valid && self.vram_total_mb > 0 {
            self.memory_pressure = clamp01(self.vram_used_mb as f64 / self.vram_total_mb as f64);
            self.memory_pressure_valid = true;
        }

        if self.power_draw_valid && self.power_limit_valid && self.power_limit_w > 0.0 {
            self.throttle_risk = clamp01(self.power_draw_w / self.power_limit_w);
            self.throttle_risk_valid = true;
        }
    }

    /// Append a degradation note to the sample's error field
    pub fn push_error(&mut self, note: impl AsRef<str>) {
        match &mut self.error {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(note.as_ref());
            }
            None => self.error = Some(note.as_ref().to_string()),
        }
    }
}
