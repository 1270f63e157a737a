//! Append-only JSONL event log with size-based rotation
//!
//! Every record is one JSON object per line carrying `ts` (RFC 3339 with
//! nanoseconds), `lvl`, `event`, `msg`, plus caller-supplied fields. The sink
//! is injected into the engine and supervisor so alternate sinks can be
//! swapped in without touching control internals.

use crate::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Event sink abstraction consumed by the engine and supervisor
pub trait EventSink: Send + Sync {
    /// Record an informational event
    fn info(&self, event: &str, fields: Value);

    /// Record a warning event
    fn warn(&self, event: &str, fields: Value);

    /// Record an error event
    fn error(&self, event: &str, fields: Value);
}

/// Sink that discards every event, for callers that do not supply one
#[derive(Debug, Default)]
pub struct NoopEventLog;

impl EventSink for NoopEventLog {
    fn info(&self, _event: &str, _fields: Value) {}
    fn warn(&self, _event: &str, _fields: Value) {}
    fn error(&self, _event: &str, _fields: Value) {}
}

/// JSONL event log writing to an optional file and/or stdout
pub struct JsonlEventLog {
    inner: Mutex<LogFile>,
    path: Option<PathBuf>,
    to_stdout: bool,
    max_bytes: u64,
}

struct LogFile {
    file: Option<File>,
    current_len: u64,
}

impl JsonlEventLog {
    /// Open (or create) the event log at `path`.
    ///
    /// With no path the sink writes to stdout only (when enabled). Rotation
    /// triggers when appending a line would push the file past `max_bytes`;
    /// the active file is renamed to `<path>.<yyyymmddThhmmss>` and reopened.
    pub fn new(path: Option<PathBuf>, max_bytes: u64, to_stdout: bool) -> Result<Self> {
        let (file, current_len) = match &path {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    if !dir.as_os_str().is_empty() {
                        std::fs::create_dir_all(dir)?;
                    }
                }
                let file = open_append(path)?;
                let len = file.metadata()?.len();
                (Some(file), len)
            }
            None => (None, 0),
        };

        Ok(Self {
            inner: Mutex::new(LogFile { file, current_len }),
            path,
            to_stdout,
            max_bytes,
        })
    }

    /// Sink writing to stdout only
    pub fn stdout_only() -> Self {
        Self {
            inner: Mutex::new(LogFile {
                file: None,
                current_len: 0,
            }),
            path: None,
            to_stdout: true,
            max_bytes: 0,
        }
    }

    fn write(&self, level: &str, event: &str, fields: Value) {
        let mut record = serde_json::Map::new();
        record.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)),
        );
        record.insert("lvl".to_string(), Value::String(level.to_string()));
        record.insert("event".to_string(), Value::String(event.to_string()));
        record.insert("msg".to_string(), Value::String(event.to_string()));
        if let Value::Object(extra) = fields {
            for (k, v) in extra {
                record.insert(k, v);
            }
        }

        let mut line = match serde_json::to_string(&Value::Object(record)) {
            Ok(line) => line,
            Err(_) => return,
        };
        line.push('\n');

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        if inner.file.is_some() {
            let _ = self.rotate_if_needed(&mut inner, line.len() as u64);
            let mut wrote = false;
            if let Some(file) = inner.file.as_mut() {
                let _ = file.write_all(line.as_bytes());
                wrote = true;
            }
            if wrote {
                inner.current_len += line.len() as u64;
            }
        }
        if self.to_stdout {
            print!("{line}");
        }
    }

    fn rotate_if_needed(&self, inner: &mut LogFile, incoming: u64) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        if self.max_bytes == 0 || inner.current_len + incoming <= self.max_bytes {
            return Ok(());
        }

        inner.file = None;
        let rotated = rotated_path(path);
        let _ = std::fs::rename(path, rotated);
        inner.file = Some(open_append(path)?);
        inner.current_len = 0;
        Ok(())
    }
}

impl EventSink for JsonlEventLog {
    fn info(&self, event: &str, fields: Value) {
        self.write("INFO", event, fields);
    }

    fn warn(&self, event: &str, fields: Value) {
        self.write("WARN", event, fields);
    }

    fn error(&self, event: &str, fields: Value) {
        self.write("ERROR", event, fields);
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn rotated_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(format!(".{stamp}"));
    PathBuf::from(rotated)
}
