//! Job workloads.
//!
//! This module owns the part of a job that actually runs:
//! - **Controller interface**: [`JobController`], the single seam the registry
//!   and scheduler drive
//! - **Process controller**: spawns `<command> <target_path> [args..]` and
//!   captures its output without blocking
//!
//! # Stopping
//!
//! [`ProcessController`] escalates from SIGTERM to SIGKILL and gives up after
//! the configured number of attempts, reporting
//! [`SnowflakeError::StopFailed`](crate::error::SnowflakeError::StopFailed)
//! instead of looping forever.

pub mod controller;
pub mod process;

pub use controller::{share, CapturedOutput, JobController, RunOutcome, SharedController};
pub use process::{infer_command, ProcessController};
