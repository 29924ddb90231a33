use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// Whatever a job has written so far, plus its exit code once it has exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Outcome of one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure(String),
}

impl RunOutcome {
    /// A run failed if it wrote to stderr or exited with a non-zero code.
    pub fn classify(output: &CapturedOutput) -> Self {
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            return RunOutcome::Failure(stderr.to_string());
        }
        match output.exit_code {
            Some(code) if code != 0 => RunOutcome::Failure(format!("Exit code: {}", code)),
            _ => RunOutcome::Success,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

/// Starts, stops and observes the workload of one job.
///
/// The registry and the scheduler only ever talk to this trait, so a
/// command-spawned [`ProcessController`](super::ProcessController) and a
/// plugin-supplied [`CustomJobAdapter`](crate::plugins::CustomJobAdapter) are
/// driven the same way.
#[async_trait]
pub trait JobController: Send {
    /// Start the workload. A no-op if it is already alive.
    async fn start(&mut self) -> Result<()>;

    /// Stop the workload. A no-op if it is not alive.
    async fn stop(&mut self) -> Result<()>;

    /// Cheap liveness probe, called once per job on every tick.
    async fn is_alive(&mut self) -> bool;

    /// Output captured so far. Never blocks.
    fn output(&self) -> CapturedOutput {
        CapturedOutput::default()
    }

    /// Human readable description of what this controller runs.
    fn describe(&self) -> String;
}

/// A controller owned by exactly one job record.
///
/// The lock is per job, so a slow `stop()` never blocks the registry.
pub type SharedController = Arc<Mutex<Box<dyn JobController>>>;

pub fn share(controller: Box<dyn JobController>) -> SharedController {
    Arc::new(Mutex::new(controller))
}
