//! # guard-throughput
//!
//! Turns monotonically growing output-byte counts into per-interval rates,
//! keeps them in a bounded sliding window, and computes a warmup-gated
//! baseline used by the control policy's floor checks.

pub mod tracker;

pub use tracker::{Sample, Tracker};
