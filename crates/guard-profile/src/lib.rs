//! # guard-profile
//!
//! On-disk persistence for calibration profiles.
//!
//! Profiles are keyed by (device id, workload type) in a two-level map and
//! serialized as pretty-printed JSON. Writes are full read-modify-write
//! replacements so concurrent guardians on different workloads keep each
//! other's entries intact. An unknown device id collapses to `"unknown"`, a
//! blank workload type to `"xtts"`.

pub mod store;

pub use store::{CalibrationPoint, Profile, ProfileStore};

/// Default profile store location
pub const DEFAULT_PROFILE_STORE_PATH: &str = ".guardian-profiles.json";

/// Workload-type key used when none is given
pub const DEFAULT_WORKLOAD_TYPE: &str = "xtts";

/// Device key used when the GPU UUID is unavailable
pub const UNKNOWN_DEVICE_ID: &str = "unknown";
