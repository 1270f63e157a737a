//! XTTS subprocess actuator
//!
//! Launches the workload under `sh -lc`, sizes its internal parallelism
//! through the `CONCURRENCY`/`XTTS_CONCURRENCY` environment variables, and
//! meters combined stdout+stderr bytes as the engine's throughput proxy.
//! Output is persisted to an append-only file (a temporary one when no path
//! is configured), optionally tee'd to the guardian's stdout.

use crate::workload::WorkloadActuator;
use crate::{ActuatorError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Actuator configuration
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Append-only file receiving the workload's combined output.
    /// A temporary file is created when unset.
    pub output_path: Option<PathBuf>,

    /// Grace period before the child is force-killed on stop
    pub stop_timeout: Duration,

    /// Mirror workload output to the guardian's stdout
    pub echo_output: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            output_path: None,
            stop_timeout: Duration::from_secs(5),
            echo_output: false,
        }
    }
}

/// Subprocess actuator for the XTTS batch workload.
///
/// All mutators serialise on one mutex; the byte counter uses atomic adds.
/// At most one live child exists per instance.
pub struct XttsAdapter {
    cfg: AdapterConfig,
    bytes: Arc<AtomicU64>,
    inner: Mutex<Inner>,
}

struct Inner {
    child: Option<Child>,
    command: Option<String>,
    concurrency: u32,
    pid: Option<u32>,
    output_path: Option<PathBuf>,
}

/// Shared tee target for the child's stdout and stderr pumps
struct OutputSink {
    bytes: Arc<AtomicU64>,
    file: Mutex<tokio::fs::File>,
    echo: bool,
}

impl OutputSink {
    async fn write(&self, chunk: &[u8]) {
        self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        {
            let mut file = self.file.lock().await;
            if let Err(err) = file.write_all(chunk).await {
                warn!("failed to persist workload output: {err}");
            }
        }
        if self.echo {
            let _ = tokio::io::stdout().write_all(chunk).await;
        }
    }
}

impl XttsAdapter {
    pub fn new(cfg: AdapterConfig) -> Self {
        Self {
            cfg,
            bytes: Arc::new(AtomicU64::new(0)),
            inner: Mutex::new(Inner {
                child: None,
                command: None,
                concurrency: 1,
                pid: None,
                output_path: None,
            }),
        }
    }

    /// Resolved output file path, once a start has created it
    pub async fn output_path(&self) -> Option<PathBuf> {
        self.inner.lock().await.output_path.clone()
    }

    fn ensure_output_path(&self, inner: &mut Inner) -> Result<PathBuf> {
        if let Some(path) = &inner.output_path {
            return Ok(path.clone());
        }
        let path = match &self.cfg.output_path {
            Some(path) => path.clone(),
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix("guardian-xtts-output-")
                    .suffix(".log")
                    .tempfile()?;
                let (_, path) = tmp.keep().map_err(|e| ActuatorError::Io(e.error))?;
                path
            }
        };
        inner.output_path = Some(path.clone());
        Ok(path)
    }

    async fn start_locked(&self, inner: &mut Inner, command: &str, concurrency: u32) -> Result<()> {
        let output_path = self.ensure_output_path(inner)?;
        if let Some(dir) = output_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&output_path)?;

        let mut child = Command::new("sh")
            .arg("-lc")
            .arg(command)
            .env("CONCURRENCY", concurrency.to_string())
            .env("XTTS_CONCURRENCY", concurrency.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ActuatorError::Spawn(e.to_string()))?;

        self.bytes.store(0, Ordering::Relaxed);
        let sink = Arc::new(OutputSink {
            bytes: Arc::clone(&self.bytes),
            file: Mutex::new(tokio::fs::File::from_std(file)),
            echo: self.cfg.echo_output,
        });

        if let Some(stdout) = child.stdout.take() {
            spawn_pump(stdout, Arc::clone(&sink));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_pump(stderr, Arc::clone(&sink));
        }

        inner.pid = child.id();
        inner.child = Some(child);
        inner.command = Some(command.to_string());
        inner.concurrency = concurrency;
        info!(
            pid = inner.pid,
            concurrency, "started workload process"
        );
        Ok(())
    }

    async fn stop_locked(&self, inner: &mut Inner) -> Result<()> {
        let mut child = match inner.child.take() {
            Some(child) => child,
            None => {
                inner.pid = None;
                return Ok(());
            }
        };
        self.bytes.store(0, Ordering::Relaxed);

        // Graceful first: the workload contract requires a clean exit on
        // termination signals within the stop timeout.
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Err(err) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("failed to send SIGTERM: {err}");
            } else {
                debug!(pid, "sent SIGTERM to workload");
            }
        }

        match tokio::time::timeout(self.cfg.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(?status, "workload stopped gracefully");
            }
            Ok(Err(err)) => {
                error!("error waiting for workload exit: {err}");
            }
            Err(_) => {
                warn!(
                    "graceful stop timed out after {:?}, forcing kill",
                    self.cfg.stop_timeout
                );
                if let Err(err) = child.kill().await {
                    error!("failed to kill workload: {err}");
                }
                let _ = child.wait().await;
            }
        }

        inner.pid = None;
        Ok(())
    }
}

#[async_trait]
impl WorkloadActuator for XttsAdapter {
    async fn start(&self, command: &str, concurrency: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.child.is_some() {
            return Err(ActuatorError::AlreadyStarted);
        }
        let concurrency = concurrency.max(1);
        self.start_locked(&mut inner, command, concurrency).await
    }

    async fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await
    }

    async fn resume(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.child.is_some() {
            return Err(ActuatorError::AlreadyRunning);
        }
        let command = inner.command.clone().ok_or(ActuatorError::NoCommand)?;
        let concurrency = inner.concurrency.max(1);
        self.start_locked(&mut inner, &command, concurrency).await
    }

    async fn update_parameters(&self, concurrency: u32) -> Result<()> {
        if concurrency == 0 {
            return Err(ActuatorError::InvalidParameter(
                "concurrency must be positive".to_string(),
            ));
        }
        let mut inner = self.inner.lock().await;
        inner.concurrency = concurrency;
        Ok(())
    }

    async fn restart(&self, concurrency: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let concurrency = if concurrency == 0 {
            inner.concurrency
        } else {
            concurrency
        };
        self.stop_locked(&mut inner).await?;
        let command = inner.command.clone().ok_or(ActuatorError::NoCommand)?;
        self.start_locked(&mut inner, &command, concurrency).await
    }

    async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await
    }

    fn output_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    async fn is_running(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn pid(&self) -> Option<u32> {
        let inner = self.inner.lock().await;
        if inner.child.is_some() {
            inner.pid
        } else {
            None
        }
    }
}

fn spawn_pump<R>(reader: R, sink: Arc<OutputSink>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.write(&buf[..n]).await,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_with(dir: &tempfile::TempDir) -> XttsAdapter {
        XttsAdapter::new(AdapterConfig {
            output_path: Some(dir.path().join("workload.log")),
            stop_timeout: Duration::from_secs(2),
            echo_output: false,
        })
    }

    #[tokio::test]
    async fn test_start_counts_output_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);

        adapter.start("yes guardian", 2).await.unwrap();
        assert!(adapter.is_running().await);
        assert!(adapter.pid().await.is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(adapter.output_bytes() > 0);

        adapter.stop().await.unwrap();
        assert!(!adapter.is_running().await);
        assert!(adapter.pid().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrency_env_vars_reach_the_workload() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);

        adapter
            .start("echo conc=$CONCURRENCY xtts=$XTTS_CONCURRENCY", 3)
            .await
            .unwrap();
        // Give the short-lived child time to exit and the pumps to drain.
        tokio::time::sleep(Duration::from_millis(400)).await;
        adapter.stop().await.unwrap();

        let output = std::fs::read_to_string(dir.path().join("workload.log")).unwrap();
        assert!(output.contains("conc=3 xtts=3"));
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);

        adapter.start("sleep 5", 1).await.unwrap();
        let second = adapter.start("sleep 5", 1).await;
        assert!(matches!(second, Err(ActuatorError::AlreadyStarted)));

        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);
        adapter.stop().await.unwrap();
        adapter.stop().await.unwrap();
        assert!(!adapter.is_running().await);
    }

    #[tokio::test]
    async fn test_restart_replaces_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);

        adapter.start("sleep 5", 1).await.unwrap();
        let first_pid = adapter.pid().await.unwrap();

        adapter.restart(2).await.unwrap();
        assert!(adapter.is_running().await);
        let second_pid = adapter.pid().await.unwrap();
        assert_ne!(first_pid, second_pid);

        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_without_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);
        let result = adapter.restart(2).await;
        assert!(matches!(result, Err(ActuatorError::NoCommand)));
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);

        adapter.start("sleep 5", 2).await.unwrap();
        adapter.pause().await.unwrap();
        assert!(!adapter.is_running().await);

        adapter.resume().await.unwrap();
        assert!(adapter.is_running().await);

        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_while_running_fails() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);

        adapter.start("sleep 5", 1).await.unwrap();
        assert!(matches!(
            adapter.resume().await,
            Err(ActuatorError::AlreadyRunning)
        ));
        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_parameters_validates() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with(&dir);
        assert!(adapter.update_parameters(0).await.is_err());
        adapter.update_parameters(4).await.unwrap();
    }

    #[tokio::test]
    async fn test_temp_output_file_when_unconfigured() {
        let adapter = XttsAdapter::new(AdapterConfig {
            output_path: None,
            stop_timeout: Duration::from_secs(2),
            echo_output: false,
        });

        adapter.start("echo hello", 1).await.unwrap();
        let path = adapter.output_path().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        adapter.stop().await.unwrap();

        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }
}
