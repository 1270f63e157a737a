//! GPU telemetry collection via the platform query tool
//!
//! The collector shells out to `nvidia-smi` once per call and parses a single
//! CSV row. The command seam is a trait so tests (and alternate platforms) can
//! substitute scripted output.

use crate::sample::TelemetrySample;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

/// Extended query: UUID, thermals, memory, power, clocks, throttle reasons
const QUERY_FIELDS: &str = "gpu_uuid,temperature.gpu,utilization.gpu,memory.used,memory.total,power.draw,power.limit,clocks.current.sm,clocks.current.memory,clocks_throttle_reasons.active";

/// Reduced query used when the extended one is rejected by older drivers
const QUERY_FIELDS_FALLBACK: &str = "temperature.gpu,utilization.gpu,memory.used,memory.total";

/// Seam for invoking the platform GPU query tool
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run one `--query-gpu=<query>` invocation and return raw stdout
    async fn query(&self, query: &str) -> std::io::Result<Vec<u8>>;
}

/// Production runner invoking `nvidia-smi`
#[derive(Debug, Default)]
pub struct NvidiaSmiRunner;

#[async_trait]
impl QueryRunner for NvidiaSmiRunner {
    async fn query(&self, query: &str) -> std::io::Result<Vec<u8>> {
        let output = tokio::process::Command::new("nvidia-smi")
            .arg(format!("--query-gpu={query}"))
            .arg("--format=csv,noheader,nounits")
            .output()
            .await?;
        if !output.status.success() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("nvidia-smi exited with {}", output.status),
            ));
        }
        Ok(output.stdout)
    }
}

/// One-shot GPU telemetry collector
pub struct Collector {
    runner: Box<dyn QueryRunner>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    /// Collector backed by the real `nvidia-smi` binary
    pub fn new() -> Self {
        Self {
            runner: Box::new(NvidiaSmiRunner),
        }
    }

    /// Collector backed by a custom runner (tests, alternate platforms)
    pub fn with_runner(runner: Box<dyn QueryRunner>) -> Self {
        Self { runner }
    }

    /// Take one GPU snapshot.
    ///
    /// Never fails: parse and invocation problems degrade the sample's
    /// validity flags and error note instead of propagating.
    pub async fn sample(&self) -> TelemetrySample {
        let mut sample = TelemetrySample::new(Utc::now());

        let output = match self.runner.query(QUERY_FIELDS).await {
            Ok(output) => output,
            Err(primary_err) => match self.runner.query(QUERY_FIELDS_FALLBACK).await {
                Ok(output) => {
                    sample.push_error("telemetry query fallback: extended fields unavailable");
                    output
                }
                Err(fallback_err) => {
                    sample.push_error(format!(
                        "nvidia-smi error: {primary_err}; fallback error: {fallback_err}"
                    ));
                    return sample;
                }
            },
        };

        let text = String::from_utf8_lossy(&output);
        let first_row = match text.lines().find(|line| !line.trim().is_empty()) {
            Some(row) => row,
            None => {
                sample.push_error("nvidia-smi returned empty output");
                return sample;
            }
        };

        let parts: Vec<&str> = first_row.split(',').map(str::trim).collect();
        if parts.len() < 4 {
            sample.push_error("nvidia-smi output format mismatch");
            return sample;
        }

        // A leading GPU-prefixed field is the device UUID; otherwise the row
        // starts directly with the temperature column.
        let mut offset = 0;
        if parts[0].starts_with("GPU-") {
            sample.gpu_uuid = parts[0].to_string();
            sample.gpu_uuid_valid = true;
            offset = 1;
        }

        if parts.len() < offset + 4 {
            sample.derive_metrics();
            return sample;
        }

        match parse_int(parts[offset]) {
            Ok(v) => {
                sample.temp_c = v;
                sample.temp_valid = true;
            }
            Err(err) => sample.push_error(format!("temp parse failed: {err}")),
        }
        match parse_float(parts[offset + 1]) {
            Ok(v) => {
                sample.util_pct = v;
                sample.util_valid = true;
            }
            Err(err) => sample.push_error(format!("util parse failed: {err}")),
        }
        match parse_int(parts[offset + 2]) {
            Ok(v) => {
                sample.vram_used_mb = v;
                sample.vram_used_valid = true;
            }
            Err(err) => sample.push_error(format!("memory.used parse failed: {err}")),
        }
        match parse_int(parts[offset + 3]) {
            Ok(v) => {
                sample.vram_total_mb = v;
                sample.vram_total_valid = true;
            }
            Err(err) => sample.push_error(format!("memory.total parse failed: {err}")),
        }

        if parts.len() < offset + 9 {
            sample.derive_metrics();
            return sample;
        }

        match parse_float(parts[offset + 4]) {
            Ok(v) => {
                sample.power_draw_w = v;
                sample.power_draw_valid = true;
            }
            Err(err) => sample.push_error(format!("power.draw parse failed: {err}")),
        }
        match parse_float(parts[offset + 5]) {
            Ok(v) => {
                sample.power_limit_w = v;
                sample.power_limit_valid = true;
            }
            Err(err) => sample.push_error(format!("power.limit parse failed: {err}")),
        }
        match parse_float(parts[offset + 6]) {
            Ok(v) => {
                sample.clock_sm_mhz = v;
                sample.clock_sm_valid = true;
            }
            Err(err) => sample.push_error(format!("clocks.current.sm parse failed: {err}")),
        }
        match parse_float(parts[offset + 7]) {
            Ok(v) => {
                sample.clock_mem_mhz = v;
                sample.clock_mem_valid = true;
            }
            Err(err) => sample.push_error(format!("clocks.current.memory parse failed: {err}")),
        }

        sample.throttle_reasons = parts[offset + 8].to_string();
        sample.throttle_reasons_valid = true;

        sample.derive_metrics();
        debug!(
            temp_c = sample.temp_c,
            temp_valid = sample.temp_valid,
            memory_pressure = sample.memory_pressure,
            "collected telemetry sample"
        );
        sample
    }
}

fn parse_int(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty field".to_string());
    }
    trimmed.parse::<i64>().map_err(|e| e.to_string())
}

fn parse_float(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty field".to_string());
    }
    trimmed.parse::<f64>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Runner returning scripted responses per query string
    struct ScriptedRunner {
        extended: Mutex<std::io::Result<Vec<u8>>>,
        fallback: Mutex<std::io::Result<Vec<u8>>>,
    }

    impl ScriptedRunner {
        fn ok(extended: &str) -> Self {
            Self {
                extended: Mutex::new(Ok(extended.as_bytes().to_vec())),
                fallback: Mutex::new(Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "unused",
                ))),
            }
        }

        fn failing_extended(fallback: &str) -> Self {
            Self {
                extended: Mutex::new(Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "field not supported",
                ))),
                fallback: Mutex::new(Ok(fallback.as_bytes().to_vec())),
            }
        }

        fn failing_both() -> Self {
            Self {
                extended: Mutex::new(Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no nvidia-smi",
                ))),
                fallback: Mutex::new(Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no nvidia-smi",
                ))),
            }
        }
    }

    #[async_trait]
    impl QueryRunner for ScriptedRunner {
        async fn query(&self, query: &str) -> std::io::Result<Vec<u8>> {
            let slot = if query.contains("gpu_uuid") {
                &self.extended
            } else {
                &self.fallback
            };
            let mut guard = slot.lock().unwrap();
            std::mem::replace(
                &mut *guard,
                Err(std::io::Error::new(std::io::ErrorKind::Other, "consumed")),
            )
        }
    }

    #[tokio::test]
    async fn test_full_extended_row() {
        let row = "GPU-8e1e6f2a, 67, 93, 8192, 24576, 310.5, 450.0, 2520, 10501, Not Active\n";
        let collector = Collector::with_runner(Box::new(ScriptedRunner::ok(row)));
        let s = collector.sample().await;

        assert_eq!(s.gpu_uuid, "GPU-8e1e6f2a");
        assert!(s.gpu_uuid_valid);
        assert_eq!(s.temp_c, 67);
        assert!(s.temp_valid);
        assert_eq!(s.util_pct, 93.0);
        assert_eq!(s.vram_used_mb, 8192);
        assert_eq!(s.vram_total_mb, 24576);
        assert_eq!(s.power_draw_w, 310.5);
        assert_eq!(s.power_limit_w, 450.0);
        assert_eq!(s.clock_sm_mhz, 2520.0);
        assert_eq!(s.clock_mem_mhz, 10501.0);
        assert_eq!(s.throttle_reasons, "Not Active");
        assert!(s.throttle_reasons_valid);
        assert!(s.memory_pressure_valid);
        assert!((s.memory_pressure - 8192.0 / 24576.0).abs() < 1e-9);
        assert!(s.throttle_risk_valid);
        assert!((s.throttle_risk - 310.5 / 450.0).abs() < 1e-9);
        assert!(s.error.is_none());
    }

    #[tokio::test]
    async fn test_row_without_uuid_parses_from_index_zero() {
        let row = "71, 88, 10240, 16384, 200.0, 250.0, 1800, 9000, None";
        let collector = Collector::with_runner(Box::new(ScriptedRunner::ok(row)));
        let s = collector.sample().await;

        assert!(!s.gpu_uuid_valid);
        assert_eq!(s.temp_c, 71);
        assert!(s.temp_valid);
        assert_eq!(s.vram_total_mb, 16384);
    }

    #[tokio::test]
    async fn test_fallback_query_flags_missing_extended_fields() {
        let collector =
            Collector::with_runner(Box::new(ScriptedRunner::failing_extended("64, 55, 4096, 8192")));
        let s = collector.sample().await;

        assert!(s.temp_valid);
        assert_eq!(s.temp_c, 64);
        assert!(s.memory_pressure_valid);
        assert!(!s.power_draw_valid);
        assert!(!s.throttle_risk_valid);
        assert!(!s.throttle_reasons_valid);
        assert!(s
            .error
            .as_deref()
            .unwrap()
            .contains("extended fields unavailable"));
    }

    #[tokio::test]
    async fn test_both_queries_failing_yields_empty_sample() {
        let collector = Collector::with_runner(Box::new(ScriptedRunner::failing_both()));
        let s = collector.sample().await;

        assert!(!s.temp_valid);
        assert!(!s.memory_pressure_valid);
        let note = s.error.as_deref().unwrap();
        assert!(note.contains("nvidia-smi error"));
        assert!(note.contains("fallback error"));
    }

    #[tokio::test]
    async fn test_per_field_parse_failure_is_isolated() {
        let row = "GPU-abc, not-a-number, 88, 10240, 16384, 200.0, 250.0, 1800, 9000, None";
        let collector = Collector::with_runner(Box::new(ScriptedRunner::ok(row)));
        let s = collector.sample().await;

        assert!(!s.temp_valid);
        assert!(s.util_valid);
        assert!(s.memory_pressure_valid);
        assert!(s.error.as_deref().unwrap().contains("temp parse failed"));
    }

    #[tokio::test]
    async fn test_empty_output() {
        let collector = Collector::with_runner(Box::new(ScriptedRunner::ok("\n  \n")));
        let s = collector.sample().await;
        assert!(s.error.as_deref().unwrap().contains("empty output"));
    }

    #[tokio::test]
    async fn test_short_row_is_format_mismatch() {
        let collector = Collector::with_runner(Box::new(ScriptedRunner::ok("42, 17")));
        let s = collector.sample().await;
        assert!(!s.temp_valid);
        assert!(s.error.as_deref().unwrap().contains("format mismatch"));
    }

    #[tokio::test]
    async fn test_only_first_row_is_parsed() {
        let rows = "60, 50, 1000, 2000\n99, 99, 9999, 9999";
        let collector = Collector::with_runner(Box::new(ScriptedRunner::ok(rows)));
        let s = collector.sample().await;
        assert_eq!(s.temp_c, 60);
    }
}
