//! Session lifecycle supervision with bounded recovery

use crate::{checkpoint, MAX_SESSION_ERRORS};
use chrono::{DateTime, Utc};
use guard_adapter::{AdapterConfig, WorkloadActuator, XttsAdapter};
use guard_control::{ActionType, RuleConfig, RuleController};
use guard_core::config::{GuardianConfig, SessionMode};
use guard_core::{EventSink, JsonlEventLog, Result};
use guard_engine::{Engine, EngineConfig, RunState, TelemetrySource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The supervisor's high-level intent for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionGoal {
    /// Actively running the engine
    #[default]
    Run,
    /// Between recovery attempts after a recoverable failure
    Recovering,
    /// Parked after a policy pause or recovery exhaustion
    Paused,
    /// Terminal, no further engine runs
    Stopped,
}

impl std::fmt::Display for SessionGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionGoal::Run => "run",
            SessionGoal::Recovering => "recovering",
            SessionGoal::Paused => "paused",
            SessionGoal::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Session snapshot, persisted verbatim as the checkpoint schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    pub goal: SessionGoal,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_log_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub state: RunState,
}

impl Session {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            goal: SessionGoal::Run,
            started_at: Utc::now(),
            stopped_at: None,
            retries: 0,
            errors: Vec::new(),
            checkpoint_path: None,
            telemetry_log_path: None,
            last_reason: String::new(),
            last_error: None,
            state: RunState::default(),
        }
    }

    /// Append to the bounded error ring, evicting the oldest entries
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        if self.errors.len() > MAX_SESSION_ERRORS {
            let excess = self.errors.len() - MAX_SESSION_ERRORS;
            self.errors.drain(..excess);
        }
    }
}

/// Builds a fresh actuator for each engine run
pub type ActuatorFactory = Box<dyn Fn() -> Arc<dyn WorkloadActuator> + Send + Sync>;

/// Builds a fresh telemetry source for each engine run
pub type TelemetryFactory = Box<dyn Fn() -> Box<dyn TelemetrySource> + Send + Sync>;

/// Wraps engine runs in the session lifecycle state machine.
///
/// A run terminating with `workload_exited_unexpectedly` is recoverable and
/// retried after `recovery_cooldown_sec`; every other termination is
/// terminal. Exhausting `recovery_max_retries` parks the session paused.
pub struct Supervisor {
    config: GuardianConfig,
    logger: Arc<dyn EventSink>,
    actuator_factory: ActuatorFactory,
    telemetry_factory: TelemetryFactory,
    session: Mutex<Session>,
}

impl Supervisor {
    /// Build a supervisor over a guardian configuration.
    ///
    /// The configuration is normalized here; stateful sessions without a
    /// checkpoint path get one generated under the system temp directory.
    pub fn new(mut config: GuardianConfig) -> Self {
        config.normalize();

        let mut session = Session::new(config.session.mode);
        if config.session.mode == SessionMode::Stateful {
            if config.session.checkpoint_path.is_none() {
                config.session.checkpoint_path = Some(
                    std::env::temp_dir().join(format!("guardian-session-{}.json", session.id)),
                );
            }
            session.checkpoint_path = config.session.checkpoint_path.clone();
            session.telemetry_log_path = config.engine.telemetry_log_path.clone();
        }

        let logger: Arc<dyn EventSink> = match JsonlEventLog::new(
            config.logging.log_file.clone(),
            config.logging.log_max_size_bytes,
            config.logging.echo_to_stdout,
        ) {
            Ok(log) => Arc::new(log),
            Err(err) => {
                warn!("failed to open event log, logging to stdout only: {err}");
                Arc::new(JsonlEventLog::stdout_only())
            }
        };

        let workload = config.workload.clone();
        Self {
            config,
            logger,
            actuator_factory: Box::new(move || {
                Arc::new(XttsAdapter::new(AdapterConfig {
                    output_path: workload.workload_log_path.clone(),
                    stop_timeout: Duration::from_secs(workload.adapter_stop_timeout_sec),
                    echo_output: workload.echo_workload_output,
                }))
            }),
            telemetry_factory: Box::new(|| Box::new(guard_telemetry::Collector::new())),
            session: Mutex::new(session),
        }
    }

    /// Route supervisor and engine events to the given sink
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.logger = sink;
        self
    }

    /// Substitute the actuator factory (scripted actuators in tests)
    pub fn with_actuator_factory(mut self, factory: ActuatorFactory) -> Self {
        self.actuator_factory = factory;
        self
    }

    /// Substitute the telemetry factory (scripted telemetry in tests)
    pub fn with_telemetry_factory(mut self, factory: TelemetryFactory) -> Self {
        self.telemetry_factory = factory;
        self
    }

    /// Snapshot of the current session state
    pub fn session(&self) -> Session {
        self.lock().clone()
    }

    /// Run the session until a terminal goal is reached.
    ///
    /// Returns the final session snapshot; configuration and start errors
    /// propagate after being recorded on the session.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Session> {
        let (seeded_concurrency, seeded_baseline) = self.checkpoint_seed();
        self.persist();

        loop {
            if cancel.is_cancelled() {
                self.finish(SessionGoal::Stopped, "shutdown_requested");
                break;
            }

            let actuator = (self.actuator_factory)();
            let controller = RuleController::new(RuleConfig::from_guardian(&self.config));
            let mut engine_cfg = EngineConfig::from_guardian(&self.config);
            if let Some(concurrency) = seeded_concurrency {
                engine_cfg.start_concurrency = concurrency;
            }
            if let Some(baseline) = seeded_baseline {
                engine_cfg.initial_baseline_throughput = baseline;
            }

            let mut engine = Engine::new(engine_cfg, Arc::clone(&actuator), Box::new(controller))
                .with_event_sink(Arc::clone(&self.logger))
                .with_telemetry_source((self.telemetry_factory)());

            let outcome = engine.start(cancel.child_token()).await;

            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    let message = err.to_string();
                    {
                        let mut session = self.lock();
                        session.last_error = Some(message.clone());
                        session.push_error(message);
                    }
                    self.finish(SessionGoal::Stopped, "engine_error");
                    return Err(err);
                }
            };

            {
                let mut session = self.lock();
                session.state = result.state.clone();
                session.last_reason = result.reason.clone();
            }

            if result.reason != "workload_exited_unexpectedly" {
                let goal = if result.state.last_action.kind == ActionType::Pause {
                    SessionGoal::Paused
                } else {
                    SessionGoal::Stopped
                };
                self.finish(goal, &result.reason);
                break;
            }

            // Recoverable: the workload died underneath the engine.
            {
                let mut session = self.lock();
                session.last_error = Some(result.reason.clone());
                session.push_error(&result.reason);
            }

            let retries = self.lock().retries;
            if retries >= self.config.session.recovery_max_retries {
                warn!(retries, "recovery retries exhausted, parking session");
                let _ = actuator.pause().await;
                self.finish(SessionGoal::Paused, "recovery_retries_exhausted");
                break;
            }

            {
                let mut session = self.lock();
                session.retries += 1;
                session.goal = SessionGoal::Recovering;
            }
            self.persist();
            info!(
                retry = retries + 1,
                max = self.config.session.recovery_max_retries,
                "recovering workload after unexpected exit"
            );
            self.logger.info(
                "session_recovering",
                json!({
                    "retry": retries + 1,
                    "max_retries": self.config.session.recovery_max_retries,
                }),
            );

            let cooldown = Duration::from_secs(self.config.session.recovery_cooldown_sec);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.finish(SessionGoal::Stopped, "shutdown_requested");
                    break;
                }
                _ = tokio::time::sleep(cooldown) => {}
            }
        }

        Ok(self.session())
    }

    /// Seed start concurrency and baseline from a parsable checkpoint
    fn checkpoint_seed(&self) -> (Option<u32>, Option<f64>) {
        if self.config.session.mode != SessionMode::Stateful {
            return (None, None);
        }
        let path = match &self.config.session.checkpoint_path {
            Some(path) => path,
            None => return (None, None),
        };
        let restored = match checkpoint::read_checkpoint(path) {
            Ok(session) => session,
            Err(_) => return (None, None),
        };

        let concurrency = if restored.state.current_concurrency > 0 {
            Some(restored.state.current_concurrency.clamp(
                self.config.engine.min_concurrency,
                self.config.engine.max_concurrency,
            ))
        } else {
            None
        };
        let baseline = if restored.state.baseline_throughput > 0.0 {
            Some(restored.state.baseline_throughput)
        } else {
            None
        };
        info!(?concurrency, ?baseline, "seeded session from checkpoint");
        (concurrency, baseline)
    }

    fn finish(&self, goal: SessionGoal, reason: &str) {
        {
            let mut session = self.lock();
            session.goal = goal;
            session.stopped_at = Some(Utc::now());
            if session.last_reason.is_empty() {
                session.last_reason = reason.to_string();
            }
        }
        self.persist();
        self.logger.info(
            "session_finished",
            json!({"goal": goal.to_string(), "reason": reason}),
        );
    }

    fn persist(&self) {
        if self.config.session.mode != SessionMode::Stateful {
            return;
        }
        let path = match &self.config.session.checkpoint_path {
            Some(path) => path.clone(),
            None => return,
        };
        let snapshot = self.session();
        if let Err(err) = checkpoint::write_checkpoint(&path, &snapshot) {
            warn!("failed to persist session checkpoint: {err}");
            self.logger.warn(
                "checkpoint_persist_failed",
                json!({"error": err.to_string(), "path": path.display().to_string()}),
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        match self.session.lock() {
            Ok(session) => session,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
