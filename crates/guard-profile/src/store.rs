//! Profile types and the two-level JSON store

use crate::{DEFAULT_WORKLOAD_TYPE, UNKNOWN_DEVICE_ID};
use chrono::{DateTime, Utc};
use guard_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One concurrency probe result from a calibration sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CalibrationPoint {
    pub concurrency: u32,
    pub throughput_units_per_sec: f64,
    pub avg_temp_c: f64,
    pub max_temp_c: i64,
    pub max_temp_valid: bool,
    pub temp_sample_count: u32,
    pub avg_vram_used_mb: f64,
    pub vram_used_sample_count: u32,
}

/// Calibration output consumed when seeding an engine run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub command: String,
    pub workload_type: String,
    pub gpu_uuid: String,
    pub measured_at: DateTime<Utc>,
    pub baseline_concurrency: u32,
    pub baseline_throughput: f64,
    pub safe_concurrency_ceiling: u32,
    pub throughput_drop_ratio: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thermal_saturation_curve: Vec<CalibrationPoint>,
    pub vram_per_load_unit_mb: f64,
}

/// Two-level document: device id -> workload type -> profile
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileStoreDocument {
    #[serde(default)]
    profiles: BTreeMap<String, BTreeMap<String, Profile>>,
}

/// On-disk profile store.
///
/// The whole document is replaced on every save (read-modify-write), so
/// entries for other devices and workload types survive.
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the profile for (device id, workload type).
    ///
    /// A missing store file or missing entry yields `Ok(None)`.
    pub fn load(&self, device_id: &str, workload_type: &str) -> Result<Option<Profile>> {
        let device_id = normalize_device(device_id);
        let workload_type = normalize_workload(workload_type);

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let document: ProfileStoreDocument = serde_json::from_str(&raw)
            .map_err(|e| guard_core::Error::profile_store(format!("decode profile store: {e}")))?;

        Ok(document
            .profiles
            .get(device_id.as_str())
            .and_then(|by_workload| by_workload.get(workload_type.as_str()))
            .cloned())
    }

    /// Persist the profile for (device id, workload type), preserving every
    /// other entry in the document.
    pub fn save(&self, device_id: &str, workload_type: &str, profile: Profile) -> Result<()> {
        let device_id = normalize_device(device_id);
        let workload_type = normalize_workload(workload_type);

        let mut document = match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                guard_core::Error::profile_store(format!("decode profile store: {e}"))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                ProfileStoreDocument::default()
            }
            Err(err) => return Err(err.into()),
        };

        document
            .profiles
            .entry(device_id)
            .or_default()
            .insert(workload_type, profile);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let raw = serde_json::to_string_pretty(&document)?;
        std::fs::write(&self.path, raw)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

fn normalize_device(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN_DEVICE_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_workload(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        DEFAULT_WORKLOAD_TYPE.to_string()
    } else {
        trimmed.to_string()
    }
}
