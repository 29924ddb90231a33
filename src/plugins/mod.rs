//! Pre-built jobs that are not spawned from a command and a target path.
//!
//! A [`CustomJob`] brings its own start/stop/liveness logic. At startup each
//! one is offered to the registry through
//! [`JobRegistry::register_external_job`], which runs its dependency check and
//! only then wraps it in a [`CustomJobAdapter`] so the scheduler can drive it
//! like any other [`JobController`].

pub mod service;

use async_trait::async_trait;

use crate::error::{Result, SnowflakeError};
use crate::scheduler::JobRegistry;
use crate::worker::JobController;

pub use service::ServiceJob;

#[async_trait]
pub trait CustomJob: Send {
    /// Suggested job name; the registry de-duplicates it.
    fn name(&self) -> &str;

    /// Whether the job is expected to be running when it is registered.
    fn active(&self) -> bool {
        false
    }

    /// Where this job is defined. Recorded as the job's target path.
    fn source(&self) -> String;

    /// Gate for registration. A job whose dependencies are missing is skipped.
    async fn dependency_check(&mut self) -> bool;

    async fn start(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    async fn is_alive(&mut self) -> bool;
}

/// Presents a [`CustomJob`] as a [`JobController`].
pub struct CustomJobAdapter {
    job: Box<dyn CustomJob>,
}

impl CustomJobAdapter {
    pub fn new(job: Box<dyn CustomJob>) -> Self {
        Self { job }
    }
}

#[async_trait]
impl JobController for CustomJobAdapter {
    async fn start(&mut self) -> Result<()> {
        if self.job.is_alive().await {
            tracing::warn!(job = %self.job.name(), "Custom job is already alive");
            return Ok(());
        }
        self.job.start().await
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.job.is_alive().await {
            return Ok(());
        }
        self.job.stop().await
    }

    async fn is_alive(&mut self) -> bool {
        self.job.is_alive().await
    }

    fn describe(&self) -> String {
        format!("custom job '{}' ({})", self.job.name(), self.job.source())
    }
}

/// Offer every custom job to the registry. Jobs that fail their dependency
/// check or cannot be registered are logged and skipped; the rest still load.
///
/// Returns the ids of the registered jobs.
pub async fn register_plugins(registry: &JobRegistry, jobs: Vec<Box<dyn CustomJob>>) -> Vec<String> {
    let mut registered = Vec::new();

    for job in jobs {
        let name = job.name().to_string();
        match registry.register_external_job(job).await {
            Ok(id) => registered.push(id),
            Err(SnowflakeError::DependencyMissing(_)) => {
                tracing::warn!(job = %name, "No dependencies installed for custom job, skipping");
            }
            Err(e) => {
                tracing::error!(job = %name, code = e.code(), error = %e, "Could not register custom job");
            }
        }
    }

    tracing::info!(count = registered.len(), "Custom jobs loaded");
    registered
}
