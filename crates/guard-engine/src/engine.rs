//! The periodic control loop
//!
//! Per tick: sample telemetry, slide it into the bounded window, feed the
//! throughput tracker from the actuator's byte counter, refresh the state
//! estimate, ask the policy for an action, apply cooldown (doubled on
//! directional reversals) and the bounded step, then drive the actuator.
//! Within one tick the ordering is fixed: telemetry time <= throughput time
//! <= estimate time <= decision time <= restart time.

use crate::config::EngineConfig;
use crate::state::{EngineResult, Lifecycle, LifecyclePhase, RunState};
use crate::MAX_TELEMETRY_SAMPLES;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_adapter::WorkloadActuator;
use guard_control::{Action, ActionType, ControlState, Controller, StateEstimator};
use guard_core::{EventSink, NoopEventLog, Result};
use guard_telemetry::{Collector, SampleStore, TelemetrySample};
use guard_throughput::Tracker;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Clock seam so tests can script decision times
pub type ClockFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// One telemetry snapshot per call.
///
/// The production implementation is [`Collector`]; tests inject scripted
/// sources.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn sample(&self) -> TelemetrySample;
}

#[async_trait]
impl TelemetrySource for Collector {
    async fn sample(&self) -> TelemetrySample {
        Collector::sample(self).await
    }
}

/// The control engine.
///
/// Owns the throughput tracker and estimator; receives the actuator,
/// controller, telemetry source, and event sink as injected collaborators.
pub struct Engine {
    cfg: EngineConfig,
    logger: Arc<dyn EventSink>,
    actuator: Arc<dyn WorkloadActuator>,
    controller: Box<dyn Controller>,
    telemetry: Box<dyn TelemetrySource>,
    tracker: Tracker,
    estimator: StateEstimator,
    now_fn: ClockFn,
    lifecycle: Mutex<Lifecycle>,
}

impl Engine {
    /// Build an engine with the default collector, tracker, and a no-op
    /// event sink. Zero config values are coerced to their defaults here;
    /// hard validation happens at [`Engine::start`].
    pub fn new(
        mut cfg: EngineConfig,
        actuator: Arc<dyn WorkloadActuator>,
        controller: Box<dyn Controller>,
    ) -> Self {
        cfg.apply_defaults();
        let tracker = Tracker::new(
            chrono::Duration::from_std(cfg.throughput_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            chrono::Duration::from_std(cfg.baseline_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
        );
        Self {
            cfg,
            logger: Arc::new(NoopEventLog),
            actuator,
            controller,
            telemetry: Box::new(Collector::new()),
            tracker,
            estimator: StateEstimator::new(),
            now_fn: Arc::new(Utc::now),
            lifecycle: Mutex::new(Lifecycle::new(LifecyclePhase::Idle, Utc::now())),
        }
    }

    /// Route engine events to the given sink
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.logger = sink;
        self
    }

    /// Substitute the telemetry source (scripted telemetry in tests)
    pub fn with_telemetry_source(mut self, source: Box<dyn TelemetrySource>) -> Self {
        self.telemetry = source;
        self
    }

    /// Substitute the clock (scripted decision times in tests)
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.now_fn = clock;
        self
    }

    /// Snapshot of the current engine lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        match self.lifecycle.lock() {
            Ok(lifecycle) => lifecycle.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_lifecycle(&self, phase: LifecyclePhase, reason: &str, error: Option<String>) {
        let mut lifecycle = match self.lifecycle.lock() {
            Ok(lifecycle) => lifecycle,
            Err(poisoned) => poisoned.into_inner(),
        };
        lifecycle.phase = phase;
        lifecycle.reason = reason.to_string();
        lifecycle.error = error;
        lifecycle.updated_at = (self.now_fn)();
    }

    /// Launch the workload and execute the control loop until a terminal
    /// condition or cancellation.
    pub async fn start(&mut self, cancel: CancellationToken) -> Result<EngineResult> {
        self.set_lifecycle(LifecyclePhase::Starting, "starting", None);
        if let Err(err) = self.cfg.validate() {
            self.set_lifecycle(LifecyclePhase::Failed, "invalid_config", Some(err.to_string()));
            return Err(err);
        }

        let telemetry_store = match &self.cfg.telemetry_log_path {
            Some(path) => match SampleStore::new(path) {
                Ok(store) => Some(store),
                Err(err) => {
                    self.set_lifecycle(
                        LifecyclePhase::Failed,
                        "telemetry_store_failed",
                        Some(err.to_string()),
                    );
                    return Err(err);
                }
            },
            None => None,
        };

        self.logger.info(
            "engine_starting",
            json!({
                "version": self.cfg.api_version,
                "command": self.cfg.command,
                "poll_interval_seconds": self.cfg.poll_interval.as_secs_f64(),
                "min_concurrency": self.cfg.min_concurrency,
                "max_concurrency": self.cfg.max_concurrency,
                "start_concurrency": self.cfg.start_concurrency,
                "max_ticks": self.cfg.max_ticks,
            }),
        );

        let mut state = RunState {
            current_concurrency: self.cfg.start_concurrency,
            ..RunState::default()
        };
        if self.cfg.initial_baseline_throughput > 0.0 {
            self.tracker
                .restore_baseline(self.cfg.initial_baseline_throughput);
            state.baseline_throughput = self.cfg.initial_baseline_throughput;
        }

        if let Err(err) = self
            .actuator
            .start(&self.cfg.command, state.current_concurrency)
            .await
        {
            self.logger
                .error("workload_start_failed", json!({"error": err.to_string()}));
            self.set_lifecycle(LifecyclePhase::Failed, "start_failed", Some(err.to_string()));
            return Err(err.into());
        }
        self.set_lifecycle(LifecyclePhase::Running, "running", None);
        state.process_pid = self.actuator.pid().await;

        let outcome = self
            .run_loop(&cancel, &mut state, telemetry_store.as_ref())
            .await;

        // One final actuator stop regardless of how the loop ended.
        let _ = self.actuator.stop().await;
        let stopped_at = (self.now_fn)();

        let reason = outcome?;
        if self.lifecycle().phase != LifecyclePhase::Failed {
            self.set_lifecycle(LifecyclePhase::Stopped, &reason, None);
        }
        Ok(EngineResult {
            state: state.clone(),
            stopped_at,
            reason,
        })
    }

    async fn run_loop(
        &mut self,
        cancel: &CancellationToken,
        state: &mut RunState,
        telemetry_store: Option<&SampleStore>,
    ) -> Result<String> {
        let mut telemetry_window: VecDeque<TelemetrySample> = VecDeque::new();
        // Direction of the last applied concurrency change. Intervening holds
        // do not clear it; reversals pay the doubled cooldown regardless.
        let mut last_direction: Option<ActionType> = None;
        let mut interval = tokio::time::interval(self.cfg.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so ticks arrive at
        // poll-interval spacing like a plain ticker.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_lifecycle(LifecyclePhase::Stopping, "shutdown_requested", None);
                    return Ok("shutdown_requested".to_string());
                }
                _ = interval.tick() => {}
            }

            let now = (self.now_fn)();
            state.ticks += 1;
            if self.cfg.max_ticks > 0 && state.ticks > self.cfg.max_ticks {
                self.set_lifecycle(LifecyclePhase::Stopping, "max_ticks_reached", None);
                return Ok("max_ticks_reached".to_string());
            }

            if !self.actuator.is_running().await {
                self.set_lifecycle(LifecyclePhase::Failed, "workload_exited_unexpectedly", None);
                return Ok("workload_exited_unexpectedly".to_string());
            }

            let sample = self.telemetry.sample().await;
            if let Some(store) = telemetry_store {
                if let Err(err) = store.append(&sample) {
                    self.logger.warn(
                        "telemetry_persist_failed",
                        json!({
                            "error": err.to_string(),
                            "telemetry_path": self
                                .cfg
                                .telemetry_log_path
                                .as_ref()
                                .map(|p| p.display().to_string()),
                        }),
                    );
                }
            }
            telemetry_window.push_back(sample.clone());
            while telemetry_window.len() > MAX_TELEMETRY_SAMPLES {
                telemetry_window.pop_front();
            }
            state.last_telemetry = Some(sample.clone());
            state.last_telemetry_at = Some(now);

            let out_bytes = self.actuator.output_bytes();
            let throughput_sample = self.tracker.add(out_bytes, now);
            state.last_throughput = Some(throughput_sample);
            state.baseline_throughput = self.tracker.baseline();
            state.process_pid = self.actuator.pid().await;

            let telemetry_samples: Vec<TelemetrySample> =
                telemetry_window.iter().cloned().collect();
            let throughput_samples = self.tracker.samples();
            let estimate = self
                .estimator
                .estimate(&telemetry_samples, &throughput_samples);
            state.estimate = Some(estimate.clone());

            let control_state = ControlState {
                current_concurrency: state.current_concurrency,
                min_concurrency: self.cfg.min_concurrency,
                max_concurrency: self.cfg.max_concurrency,
                baseline_throughput: state.baseline_throughput,
                last_action_at: state.last_action_at,
                estimate,
                now,
            };
            let mut action =
                self.controller
                    .decide(&telemetry_samples, &throughput_samples, &control_state);

            let mut cooldown =
                effective_cooldown(self.cfg.adjustment_cooldown, action.cooldown_sec);
            if action.kind.is_directional()
                && last_direction.is_some_and(|prev| prev.is_opposite(action.kind))
            {
                cooldown *= 2;
            }
            if action.kind != ActionType::Hold {
                if let Some(last_at) = state.last_action_at {
                    let elapsed = (now - last_at).to_std().unwrap_or_default();
                    if elapsed < cooldown {
                        debug!(
                            requested = %action.kind,
                            remaining_sec = (cooldown - elapsed).as_secs_f64(),
                            "action suppressed by cooldown"
                        );
                        action = Action::hold(state.current_concurrency, "cooldown");
                    }
                }
            }

            let throughput_ratio = if state.baseline_throughput > 0.0 {
                throughput_sample.rate / state.baseline_throughput
            } else {
                0.0
            };

            if action.kind == ActionType::Pause {
                state.last_action_at = Some(now);
                if let Err(err) = self.actuator.pause().await {
                    self.logger
                        .error("workload_pause_failed", json!({"error": err.to_string()}));
                    self.set_lifecycle(
                        LifecyclePhase::Failed,
                        "failed_to_pause_workload",
                        Some(err.to_string()),
                    );
                    return Err(err.into());
                }
                state.last_action = action.clone();
                self.set_lifecycle(LifecyclePhase::Stopping, &action.reason, None);
                self.logger.info(
                    "workload_paused",
                    json!({
                        "reason": action.reason,
                        "concurrency": state.current_concurrency,
                    }),
                );
                return Ok(action.reason);
            }

            if action.kind != ActionType::Hold {
                let target = bounded_step(
                    state.current_concurrency,
                    action.concurrency,
                    self.cfg.min_concurrency,
                    self.cfg.max_concurrency,
                    self.cfg.max_concurrency_step,
                );
                if target == state.current_concurrency {
                    action = Action::hold(state.current_concurrency, "bounded by step/min-max");
                } else {
                    action.concurrency = target;
                }
            }
            state.last_action = action.clone();

            self.logger.info(
                "engine_tick",
                json!({
                    "timestamp": now.to_rfc3339(),
                    "pid": state.process_pid,
                    "action": action.kind.to_string(),
                    "action_reason": action.reason,
                    "concurrency": state.current_concurrency,
                    "target_concurrency": action.concurrency,
                    "temp_c": sample.temp_c,
                    "temp_valid": sample.temp_valid,
                    "util_pct": sample.util_pct,
                    "util_valid": sample.util_valid,
                    "vram_used_mb": sample.vram_used_mb,
                    "vram_total_mb": sample.vram_total_mb,
                    "vram_valid": sample.vram_used_valid && sample.vram_total_valid,
                    "memory_pressure": sample.memory_pressure,
                    "memory_pressure_valid": sample.memory_pressure_valid,
                    "throttle_risk": sample.throttle_risk,
                    "throttle_risk_valid": sample.throttle_risk_valid,
                    "effective_cooldown_sec": cooldown.as_secs_f64(),
                    "throughput_bps": throughput_sample.rate,
                    "baseline_bps": state.baseline_throughput,
                    "throughput_ratio": throughput_ratio,
                    "telemetry_error": sample.error,
                    "temp_slope_c_per_sec": state.estimate.as_ref().map(|e| e.temp_slope_c_per_sec),
                    "temp_slope_valid": state.estimate.as_ref().map(|e| e.temp_slope_valid),
                    "throughput_trend": state.estimate.as_ref().map(|e| e.throughput_trend),
                    "throughput_trend_valid": state.estimate.as_ref().map(|e| e.throughput_trend_valid),
                    "throttle_risk_score": state.estimate.as_ref().map(|e| e.throttle_risk_score),
                    "throttle_risk_score_valid": state.estimate.as_ref().map(|e| e.throttle_risk_score_valid),
                    "stability_index": state.estimate.as_ref().map(|e| e.stability_index),
                    "stability_index_valid": state.estimate.as_ref().map(|e| e.stability_index_valid),
                    "estimate_confidence": state.estimate.as_ref().map(|e| e.confidence),
                    "estimate_confidence_valid": state.estimate.as_ref().map(|e| e.confidence_valid),
                }),
            );

            if action.kind == ActionType::Hold {
                continue;
            }

            state.last_action_at = Some(now);
            if let Err(err) = self.actuator.restart(action.concurrency).await {
                self.logger.error(
                    "workload_restart_failed",
                    json!({
                        "error": err.to_string(),
                        "target_concurrency": action.concurrency,
                    }),
                );
                continue;
            }
            state.current_concurrency = action.concurrency;
            last_direction = Some(action.kind);
            self.tracker.reset();
            self.logger.info(
                "workload_restarted",
                json!({
                    "new_concurrency": state.current_concurrency,
                    "pid": self.actuator.pid().await,
                }),
            );
        }
    }
}

/// Effective cooldown: the configured floor raised by a policy override
fn effective_cooldown(configured: Duration, override_sec: f64) -> Duration {
    if override_sec <= 0.0 {
        return configured;
    }
    let requested = Duration::from_secs_f64(override_sec);
    requested.max(configured)
}

/// Clamp the target into [min, max], then limit the move to `step`
fn bounded_step(current: u32, target: u32, min: u32, max: u32, step: u32) -> u32 {
    let target = target.clamp(min, max);
    let step = step.max(1) as i64;
    let delta = target as i64 - current as i64;
    if delta > step {
        return current + step as u32;
    }
    if delta < -step {
        return current - step as u32;
    }
    target
}
