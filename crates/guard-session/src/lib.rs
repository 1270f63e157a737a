//! # guard-session
//!
//! Session supervision for gpu-stress-guardian.
//!
//! A [`Supervisor`] wraps engine runs in a lifecycle state machine with
//! bounded automatic recovery: a run ending in `workload_exited_unexpectedly`
//! is retried after a cancellable cooldown until `recovery_max_retries` is
//! exhausted, at which point the session parks in the `paused` goal. Stateful
//! sessions persist a [`Session`] checkpoint on every transition and restore
//! concurrency and baseline from it on the next start.

pub mod checkpoint;
pub mod supervisor;

pub use checkpoint::{read_checkpoint, write_checkpoint};
pub use supervisor::{Session, SessionGoal, Supervisor};

/// Bounded ring of session error messages
pub const MAX_SESSION_ERRORS: usize = 20;
