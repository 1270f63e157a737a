//! # guard-telemetry
//!
//! GPU telemetry sampling for gpu-stress-guardian.
//!
//! This crate provides:
//! - One-shot GPU snapshots by invoking `nvidia-smi` and parsing its CSV output
//! - Per-field validity tracking so partial snapshots remain usable
//! - Derived memory-pressure and throttle-risk ratios
//! - An append-only JSONL store for recorded samples
//!
//! Sampling never fails: every call returns a well-formed [`TelemetrySample`]
//! with a current timestamp, and degradations are recorded in the sample's
//! validity flags and error note.

pub mod collector;
pub mod sample;
pub mod store;

pub use collector::{Collector, NvidiaSmiRunner, QueryRunner};
pub use sample::TelemetrySample;
pub use store::SampleStore;
