//! Append-only JSONL persistence for telemetry samples

use crate::sample::TelemetrySample;
use guard_core::Result;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Append-only sink writing one JSON object per sample per line
pub struct SampleStore {
    file: Mutex<File>,
}

impl SampleStore {
    /// Open (or create) the sample store at `path`, creating parent
    /// directories as needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one sample as a JSON line
    pub fn append(&self, sample: &TelemetrySample) -> Result<()> {
        let mut line = serde_json::to_string(sample)?;
        line.push('\n');

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
